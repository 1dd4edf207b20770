use crate::events::OutputKind;
use crate::types::OutputBlob;
use tokio::sync::mpsc;

#[derive(Debug)]
pub enum Message {
    Subscribe {
        kind: OutputKind,
        subscriber: mpsc::UnboundedSender<OutputBlob>,
    },
}
