use super::messages::WorkerMessage;
use crate::error::{Error, Result};
use crate::events::{Output, ProcessStatus};
use crate::types::{Pid, ProcessId};

use bytes::BytesMut;
use std::io;
use std::time::Duration;
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    process::Child,
    sync::mpsc,
    time,
};
use tracing::{debug, info, warn};

#[derive(Clone, Copy, Debug)]
pub struct KillPolicy {
    pub grace: Duration,
    pub timeout: Duration,
}

pub struct Actor {
    id: ProcessId,
    pid: Pid,
    inbox: mpsc::UnboundedReceiver<WorkerMessage>,
    child: Child,
    status: ProcessStatus,
    policy: KillPolicy,
}

impl Actor {
    pub fn spawn(
        id: ProcessId,
        pid: Pid,
        inbox: mpsc::UnboundedReceiver<WorkerMessage>,
        mut child: Child,
        output_tx: Option<mpsc::UnboundedSender<Output>>,
        policy: KillPolicy,
    ) {
        if let Some(output_tx) = output_tx {
            // grab stdout and stderr, if they've been piped
            if let Some(stdout) = child.stdout.take() {
                pipe(stdout, output_tx.clone(), Output::Stdout);
            }
            if let Some(stderr) = child.stderr.take() {
                pipe(stderr, output_tx, Output::Stderr);
            }
        }

        let actor = Self {
            id,
            pid,
            inbox,
            child,
            status: ProcessStatus::Running,
            policy,
        };
        tokio::spawn(async move { actor.run().await });
    }

    async fn run(mut self) {
        use WorkerMessage::*;
        while let Some(msg) = self.inbox.recv().await {
            match msg {
                GetStatus { response } => {
                    let _ = response.send(self.poll());
                }
                Stop { response } => {
                    let _ = response.send(self.stop().await);
                }
            }
        }
        // handle dropped, `kill_on_drop` takes care of a child that is somehow still alive
        debug!(process_id = %self.id, "worker exiting");
    }

    /// Non-blocking check of the child's exit status.
    fn poll(&mut self) -> Result<ProcessStatus> {
        if self.status.is_running() {
            let exited = self.child.try_wait().map_err(|source| Error::Poll {
                id: self.id,
                source,
            })?;
            if let Some(exit_status) = exited {
                self.status = exit_status.into();
                info!(process_id = %self.id, status = %self.status, "process exited");
            }
        }
        Ok(self.status)
    }

    async fn stop(&mut self) -> Result<()> {
        if !self.poll()?.is_running() {
            debug!(process_id = %self.id, "process already exited, nothing to kill");
            return Ok(());
        }

        if !self.policy.grace.is_zero() {
            let sent = terminate(self.pid).map_err(|source| Error::TerminationFailed {
                id: self.id,
                source,
            })?;
            if sent {
                if let Some(status) = self.wait_for_exit(self.policy.grace).await? {
                    self.status = status;
                    info!(process_id = %self.id, status = %self.status, "process terminated");
                    // the runner is gone, anything it forked that outlived SIGTERM is not
                    self.sweep();
                    return Ok(());
                }
                warn!(
                    process_id = %self.id,
                    grace = ?self.policy.grace,
                    "process ignored SIGTERM, sending SIGKILL"
                );
            }
        }

        self.force_kill().map_err(|source| Error::TerminationFailed {
            id: self.id,
            source,
        })?;
        match self.wait_for_exit(self.policy.timeout).await? {
            Some(status) => {
                self.status = status;
                info!(process_id = %self.id, status = %self.status, "process killed");
                Ok(())
            }
            None => Err(Error::TerminationTimeout {
                id: self.id,
                waited: self.policy.timeout,
            }),
        }
    }

    #[cfg(unix)]
    fn force_kill(&mut self) -> io::Result<()> {
        signal_group(self.pid, libc::SIGKILL)
    }

    #[cfg(not(unix))]
    fn force_kill(&mut self) -> io::Result<()> {
        self.child.start_kill()
    }

    #[cfg(unix)]
    fn sweep(&self) {
        if let Err(err) = signal_group(self.pid, libc::SIGKILL) {
            warn!(process_id = %self.id, error = %err, "failed to kill leftover process group");
        }
    }

    #[cfg(not(unix))]
    fn sweep(&self) {}

    async fn wait_for_exit(&mut self, limit: Duration) -> Result<Option<ProcessStatus>> {
        match time::timeout(limit, self.child.wait()).await {
            Ok(Ok(exit_status)) => Ok(Some(exit_status.into())),
            Ok(Err(source)) => Err(Error::TerminationFailed {
                id: self.id,
                source,
            }),
            Err(_elapsed) => Ok(None),
        }
    }
}

/// Forward everything read from `reader` until EOF.
fn pipe<R>(mut reader: R, output_tx: mpsc::UnboundedSender<Output>, wrap: fn(bytes::Bytes) -> Output)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = BytesMut::with_capacity(4096);
        loop {
            match reader.read_buf(&mut buf).await {
                Ok(n) if n > 0 => {
                    // move the bytes out of buf and into a message
                    if output_tx.send(wrap(buf.split().freeze())).is_err() {
                        break;
                    }
                }
                _ => break,
            }
        }
    });
}

/// Ask the process group to exit. Returns false where there is no such signal.
#[cfg(unix)]
fn terminate(pid: Pid) -> io::Result<bool> {
    signal_group(pid, libc::SIGTERM).map(|()| true)
}

#[cfg(not(unix))]
fn terminate(_pid: Pid) -> io::Result<bool> {
    Ok(false)
}

/// Signal every process in the group led by `pid`. A group that is already gone is not an error.
#[cfg(unix)]
fn signal_group(pid: Pid, signal: libc::c_int) -> io::Result<()> {
    // SAFETY: kill(2) takes plain integers and touches no memory of ours
    let ret = unsafe { libc::kill(-(pid as libc::pid_t), signal) };
    if ret == 0 {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        Ok(())
    } else {
        Err(err)
    }
}
