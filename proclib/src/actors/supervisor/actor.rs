use super::messages::{Reap, SupervisorMessage};
use crate::actors::{broadcaster::BroadcasterHandle, worker::WorkerHandle};
use crate::config::SupervisorConfig;
use crate::error::{Error, Result};
use crate::events::{OutputKind, ProcessStatus};
use crate::invocation::Invocation;
use crate::types::{CommandSpec, OutputBlob, ProcessId, ProcessInfo, Spawned};

use chrono::{DateTime, Utc};
use futures::future;
use std::collections::HashMap;
use std::io;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A registered process.
struct ProcessHandle {
    worker: WorkerHandle,
    output: Option<BroadcasterHandle>,
    command: String,
    args: String,
    started_at: DateTime<Utc>,
}

impl ProcessHandle {
    fn info(&self, id: ProcessId, status: ProcessStatus) -> ProcessInfo {
        ProcessInfo {
            id,
            pid: self.worker.pid(),
            command: self.command.clone(),
            args: self.args.clone(),
            started_at: self.started_at,
            status,
        }
    }
}

pub struct Supervisor {
    config: SupervisorConfig,
    inbox: mpsc::Receiver<SupervisorMessage>,
    reap_tx: mpsc::UnboundedSender<Reap>,
    reap_rx: mpsc::UnboundedReceiver<Reap>,
    registry: HashMap<ProcessId, ProcessHandle>,
}

impl Supervisor {
    pub fn spawn(config: SupervisorConfig, inbox: mpsc::Receiver<SupervisorMessage>) {
        let actor = Self::new(config, inbox);
        tokio::spawn(async move { actor.run().await });
    }

    fn new(config: SupervisorConfig, inbox: mpsc::Receiver<SupervisorMessage>) -> Self {
        let (reap_tx, reap_rx) = mpsc::unbounded_channel();
        Self {
            config,
            inbox,
            reap_tx,
            reap_rx,
            registry: HashMap::new(),
        }
    }

    async fn run(mut self) {
        use SupervisorMessage::*;
        loop {
            tokio::select! {
                maybe_msg = self.inbox.recv() => {
                    let msg = match maybe_msg {
                        Some(msg) => msg,
                        // every handle dropped, the workers kill their children when we drop the registry
                        None => break,
                    };
                    match msg {
                        Spawn { spec, response } => {
                            let _ = response.send(self.spawn_process(spec));
                        }
                        GetStatus { id, response } => self.get_status(id, response),
                        Describe { id, response } => self.describe(id, response),
                        List { response } => self.list(response),
                        Kill { id, response } => self.kill(id, response),
                        StreamOutput { id, kind, response } => {
                            let _ = response.send(self.stream_output(id, kind));
                        }
                    }
                }
                Some(reap) = self.reap_rx.recv() => self.reap(reap),
            }
        }
        debug!(processes = self.registry.len(), "supervisor exiting");
    }

    fn spawn_process(&mut self, spec: CommandSpec) -> Result<Spawned> {
        let invocation = Invocation::compose(&self.config, &spec)?;
        let child = invocation
            .command(&spec)
            .spawn()
            .map_err(|source| Error::Spawn {
                command: invocation.to_string(),
                source,
            })?;

        // tokio only forgets the pid once the child has been reaped
        let pid = child.id().ok_or_else(|| Error::Spawn {
            command: invocation.to_string(),
            source: io::Error::new(io::ErrorKind::Other, "child was reaped before it was registered"),
        })?;

        let id = Uuid::new_v4();
        let (output_tx, output) = if spec.stream_output {
            let (output_tx, output_rx) = mpsc::unbounded_channel(); // channel for piping child process output
            (
                Some(output_tx),
                Some(BroadcasterHandle::spawn(
                    output_rx,
                    self.config.output_buffer_limit,
                )),
            )
        } else {
            (None, None)
        };
        let worker = WorkerHandle::spawn(
            id,
            pid,
            child,
            output_tx,
            self.config.kill_grace,
            self.config.kill_timeout,
        );
        info!(process_id = %id, pid, command = %invocation, "process started");

        self.registry.insert(
            id,
            ProcessHandle {
                worker,
                output,
                command: spec.command,
                args: spec.args,
                started_at: Utc::now(),
            },
        );
        Ok(Spawned { id, pid })
    }

    fn get_status(&self, id: ProcessId, response: oneshot::Sender<Result<ProcessStatus>>) {
        match self.registry.get(&id) {
            Some(handle) => handle.worker.get_status(response),
            None => {
                let _ = response.send(Err(Error::NotFound(id)));
            }
        }
    }

    fn describe(&self, id: ProcessId, response: oneshot::Sender<Result<ProcessInfo>>) {
        let handle = match self.registry.get(&id) {
            Some(handle) => handle,
            None => {
                let _ = response.send(Err(Error::NotFound(id)));
                return;
            }
        };
        let snapshot = handle.info(id, ProcessStatus::Running);
        let status = request_status(&handle.worker, id);
        tokio::spawn(async move {
            let info = status.await.map(|status| ProcessInfo { status, ..snapshot });
            let _ = response.send(info);
        });
    }

    fn list(&self, response: oneshot::Sender<Result<Vec<ProcessInfo>>>) {
        let pending: Vec<_> = self
            .registry
            .iter()
            .map(|(id, handle)| {
                let snapshot = handle.info(*id, ProcessStatus::Running);
                let status = request_status(&handle.worker, *id);
                async move { status.await.map(|status| ProcessInfo { status, ..snapshot }) }
            })
            .collect();
        tokio::spawn(async move {
            let infos = future::join_all(pending).await.into_iter().collect();
            let _ = response.send(infos);
        });
    }

    /// The worker does the (possibly slow) termination, so other processes are not held up.
    /// The entry is only removed once the worker reports success, see `reap`.
    fn kill(&self, id: ProcessId, response: oneshot::Sender<Result<()>>) {
        let handle = match self.registry.get(&id) {
            Some(handle) => handle,
            None => {
                let _ = response.send(Err(Error::NotFound(id)));
                return;
            }
        };
        let (stop_tx, stop_rx) = oneshot::channel();
        handle.worker.stop(stop_tx);
        let reap_tx = self.reap_tx.clone();
        tokio::spawn(async move {
            let result = stop_rx.await.unwrap_or(Err(Error::SupervisorGone));
            let _ = reap_tx.send(Reap {
                id,
                result,
                response,
            });
        });
    }

    fn reap(&mut self, reap: Reap) {
        let Reap {
            id,
            result,
            response,
        } = reap;
        let outcome = match result {
            // a concurrent kill may have reaped it first
            Ok(()) => match self.registry.remove(&id) {
                Some(_) => {
                    info!(process_id = %id, "process removed");
                    Ok(())
                }
                None => Err(Error::NotFound(id)),
            },
            Err(err) => {
                warn!(process_id = %id, error = %err, "kill failed, keeping process registered");
                Err(err)
            }
        };
        let _ = response.send(outcome);
    }

    fn stream_output(
        &self,
        id: ProcessId,
        kind: OutputKind,
    ) -> Result<mpsc::UnboundedReceiver<OutputBlob>> {
        let handle = self.registry.get(&id).ok_or(Error::NotFound(id))?;
        let broadcaster = handle.output.as_ref().ok_or(Error::OutputNotCaptured(id))?;
        Ok(broadcaster.subscribe(kind))
    }
}

/// Ask a worker for its status without waiting on the answer here.
fn request_status(
    worker: &WorkerHandle,
    id: ProcessId,
) -> impl std::future::Future<Output = Result<ProcessStatus>> {
    let (tx, rx) = oneshot::channel();
    worker.get_status(tx);
    async move {
        match rx.await {
            Ok(status) => status,
            Err(_) => {
                debug!(process_id = %id, "worker dropped status request");
                Err(Error::SupervisorGone)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn supervisor() -> Supervisor {
        let config = SupervisorConfig::default()
            .with_runner("sh", "-c")
            .with_kill_timeouts(Duration::from_millis(500), Duration::from_secs(5));
        let (_, inbox) = mpsc::channel(1);
        Supervisor::new(config, inbox)
    }

    async fn listed(supervisor: &Supervisor) -> Vec<ProcessInfo> {
        let (response, listed) = oneshot::channel();
        supervisor.list(response);
        listed.await.expect("list answer").expect("list")
    }

    #[tokio::test]
    async fn failed_kill_keeps_the_process_registered() {
        let mut supervisor = supervisor();
        let id = supervisor
            .spawn_process(CommandSpec::new("sleep 30"))
            .expect("spawn")
            .id;

        let (response, failed) = oneshot::channel();
        supervisor.reap(Reap {
            id,
            result: Err(Error::TerminationTimeout {
                id,
                waited: Duration::from_secs(5),
            }),
            response,
        });
        assert!(matches!(
            failed.await.unwrap(),
            Err(Error::TerminationTimeout { id: timed_out, .. }) if timed_out == id
        ));
        let processes = listed(&supervisor).await;
        assert_eq!(processes.len(), 1);
        assert_eq!(processes[0].id, id);
        assert!(processes[0].status.is_running());

        // the process can still be killed afterwards
        let (response, killed) = oneshot::channel();
        supervisor.kill(id, response);
        let reap = supervisor.reap_rx.recv().await.expect("reap");
        supervisor.reap(reap);
        killed.await.unwrap().expect("second kill");
        assert!(listed(&supervisor).await.is_empty());
    }

    #[tokio::test]
    async fn failed_termination_reports_the_cause() {
        let mut supervisor = supervisor();
        let id = supervisor
            .spawn_process(CommandSpec::new("sleep 30"))
            .expect("spawn")
            .id;

        let (response, failed) = oneshot::channel();
        supervisor.reap(Reap {
            id,
            result: Err(Error::TerminationFailed {
                id,
                source: io::Error::from_raw_os_error(libc::EPERM),
            }),
            response,
        });
        assert!(matches!(
            failed.await.unwrap(),
            Err(Error::TerminationFailed { .. })
        ));
        assert!(supervisor.registry.contains_key(&id));
    }
}
