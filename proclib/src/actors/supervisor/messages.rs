use crate::error;
use crate::events::{OutputKind, ProcessStatus};
use crate::types::{CommandSpec, OutputBlob, ProcessId, ProcessInfo, Spawned};
use tokio::sync::{mpsc, oneshot};

#[derive(Debug)]
pub enum SupervisorMessage {
    Spawn {
        spec: CommandSpec,
        response: oneshot::Sender<error::Result<Spawned>>,
    },
    GetStatus {
        id: ProcessId,
        response: oneshot::Sender<error::Result<ProcessStatus>>,
    },
    Describe {
        id: ProcessId,
        response: oneshot::Sender<error::Result<ProcessInfo>>,
    },
    List {
        response: oneshot::Sender<error::Result<Vec<ProcessInfo>>>,
    },
    Kill {
        id: ProcessId,
        response: oneshot::Sender<error::Result<()>>,
    },
    StreamOutput {
        id: ProcessId,
        kind: OutputKind,
        response: oneshot::Sender<error::Result<mpsc::UnboundedReceiver<OutputBlob>>>,
    },
}

/// Sent back to the supervisor by the task waiting on a worker's stop.
#[derive(Debug)]
pub struct Reap {
    pub id: ProcessId,
    pub result: error::Result<()>,
    pub response: oneshot::Sender<error::Result<()>>,
}
