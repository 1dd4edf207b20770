mod actor;
mod messages;

use crate::events::{Output, OutputKind};
use crate::types::OutputBlob;
use actor::Actor;
use messages::Message;

use tokio::sync::mpsc::{self, UnboundedReceiver};

/// A `Broadcaster` which receives a child's output and fans it out to all subscribers.
///
/// This struct is an actor handle. The real work is done in the actor spawned by `BroadcasterHandle::spawn`.
/// Up to `buffer_limit` bytes of output are kept, so late subscribers still see the most recent output.
#[derive(Clone)]
pub struct BroadcasterHandle {
    sender: mpsc::UnboundedSender<Message>,
}

impl BroadcasterHandle {
    pub fn spawn(output_rx: UnboundedReceiver<Output>, buffer_limit: usize) -> Self {
        let (sender, inbox) = mpsc::unbounded_channel();
        Actor::spawn(inbox, output_rx, buffer_limit);
        Self { sender }
    }

    /// Subscribe to the requested output. The receiver closes once the child closes its pipes.
    pub fn subscribe(&self, kind: OutputKind) -> UnboundedReceiver<OutputBlob> {
        let (subscriber, receiver) = mpsc::unbounded_channel();
        let _ = self.sender.send(Message::Subscribe { kind, subscriber });
        receiver
    }
}
