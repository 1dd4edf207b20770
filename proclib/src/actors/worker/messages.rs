use crate::error;
use crate::events::ProcessStatus;
use tokio::sync::oneshot;

#[derive(Debug)]
pub enum WorkerMessage {
    GetStatus {
        response: oneshot::Sender<error::Result<ProcessStatus>>,
    },
    Stop {
        response: oneshot::Sender<error::Result<()>>,
    },
}
