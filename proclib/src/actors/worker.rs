mod actor;
mod messages;

use crate::error;
use crate::events::{Output, ProcessStatus};
use crate::types::{Pid, ProcessId};
use actor::{Actor, KillPolicy};
use messages::WorkerMessage;
use std::time::Duration;
use tokio::{
    process::Child,
    sync::{mpsc, oneshot},
};

/// Handle to the actor that exclusively owns one child process.
///
/// Every request for the same process goes through this actor's inbox, so they are served in order.
/// Dropping the last handle kills the child if it is still running.
#[derive(Clone)]
pub struct WorkerHandle {
    sender: mpsc::UnboundedSender<WorkerMessage>,
    pid: Pid,
}

impl WorkerHandle {
    /// Take ownership of an already spawned child whose pid is `pid`.
    ///
    /// If `output_tx` is given, the child's piped stdout and stderr are forwarded into it.
    pub fn spawn(
        id: ProcessId,
        pid: Pid,
        child: Child,
        output_tx: Option<mpsc::UnboundedSender<Output>>,
        kill_grace: Duration,
        kill_timeout: Duration,
    ) -> Self {
        let (sender, inbox) = mpsc::unbounded_channel();
        let policy = KillPolicy {
            grace: kill_grace,
            timeout: kill_timeout,
        };
        Actor::spawn(id, pid, inbox, child, output_tx, policy);
        Self { sender, pid }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    // If the actor is gone the response sender is dropped with the message,
    // which the waiting side sees as a closed channel.
    pub fn get_status(&self, response: oneshot::Sender<error::Result<ProcessStatus>>) {
        let _ = self.sender.send(WorkerMessage::GetStatus { response });
    }

    pub fn stop(&self, response: oneshot::Sender<error::Result<()>>) {
        let _ = self.sender.send(WorkerMessage::Stop { response });
    }
}
