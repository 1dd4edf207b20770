mod actor;
mod messages;

use self::{actor::Supervisor, messages::SupervisorMessage};
use crate::config::SupervisorConfig;
use crate::error::{Error, Result};
use crate::events::{OutputKind, ProcessStatus};
use crate::types::{CommandSpec, OutputBlob, ProcessId, ProcessInfo, Spawned};
use futures::future;
use tokio::sync::{mpsc, oneshot};

/// A `ProcessSupervisor` which launches external commands and tracks them until they are killed.
///
/// This struct is actually an actor handle, the registry lives in the actor spawned by `ProcessSupervisorHandle::start`.
/// Handles can be cloned freely and shared between request handlers without an `Arc<Mutex>`.
/// Once every handle is dropped the actor stops and any process still running is killed.
#[derive(Clone)]
pub struct ProcessSupervisorHandle {
    sender: mpsc::Sender<SupervisorMessage>,
}

impl ProcessSupervisorHandle {
    /// Start a new supervisor. Must be called from within a tokio runtime.
    pub fn start(config: SupervisorConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.channel_capacity.max(1));
        Supervisor::spawn(config, receiver);
        Self { sender }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T>>) -> SupervisorMessage,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|_| Error::SupervisorGone)?;
        rx.await.map_err(|_| Error::SupervisorGone)?
    }

    /// Launch `spec` through the runner and register it under a fresh id.
    ///
    /// Nothing is registered if the process could not be created.
    pub async fn spawn(&self, spec: CommandSpec) -> Result<Spawned> {
        self.request(|response| SupervisorMessage::Spawn { spec, response })
            .await
    }

    /// Poll a process without waiting on it.
    pub async fn get_status(&self, id: ProcessId) -> Result<ProcessStatus> {
        self.request(|response| SupervisorMessage::GetStatus { id, response })
            .await
    }

    pub async fn describe(&self, id: ProcessId) -> Result<ProcessInfo> {
        self.request(|response| SupervisorMessage::Describe { id, response })
            .await
    }

    pub async fn list(&self) -> Result<Vec<ProcessInfo>> {
        self.request(|response| SupervisorMessage::List { response })
            .await
    }

    /// Terminate a process if it is still running, then forget it.
    ///
    /// Sends SIGTERM first and escalates to SIGKILL after the configured grace period.
    /// If termination fails the process stays registered.
    pub async fn kill(&self, id: ProcessId) -> Result<()> {
        self.request(|response| SupervisorMessage::Kill { id, response })
            .await
    }

    /// Stream captured output, starting from the beginning.
    pub async fn stream_output(
        &self,
        id: ProcessId,
        kind: OutputKind,
    ) -> Result<mpsc::UnboundedReceiver<OutputBlob>> {
        self.request(|response| SupervisorMessage::StreamOutput { id, kind, response })
            .await
    }

    /// Kill every registered process. All kills are attempted; the first error is returned.
    pub async fn shutdown(&self) -> Result<()> {
        let processes = self.list().await?;
        let kills = processes.iter().map(|info| self.kill(info.id));
        future::join_all(kills)
            .await
            .into_iter()
            .filter(|result| !matches!(result, Err(Error::NotFound(_))))
            .collect()
    }
}
