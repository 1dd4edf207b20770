use crate::types::OutputBlob;
use std::fmt;
use std::process::ExitStatus;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessStatus {
    Running,
    Completed,
    Failed(ExitReason),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitReason {
    ExitCode(i32),
    Signal(i32),
}

impl ProcessStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, ProcessStatus::Running)
    }
}

impl From<ExitStatus> for ProcessStatus {
    fn from(status: ExitStatus) -> Self {
        match status.code() {
            Some(0) => ProcessStatus::Completed,
            Some(code) => ProcessStatus::Failed(ExitReason::ExitCode(code)),
            None => ProcessStatus::Failed(ExitReason::Signal(signal_of(status))),
        }
    }
}

#[cfg(unix)]
fn signal_of(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status.signal().unwrap_or_default()
}

#[cfg(not(unix))]
fn signal_of(_status: ExitStatus) -> i32 {
    0
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessStatus::Running => write!(f, "running"),
            ProcessStatus::Completed => write!(f, "completed"),
            ProcessStatus::Failed(ExitReason::ExitCode(code)) => {
                write!(f, "failed (exit code {})", code)
            }
            ProcessStatus::Failed(ExitReason::Signal(signal)) => {
                write!(f, "failed (signal {})", signal)
            }
        }
    }
}

#[derive(Clone, Debug)]
pub enum Output {
    Stdout(OutputBlob),
    Stderr(OutputBlob),
}

impl Output {
    pub fn blob(&self) -> &OutputBlob {
        match self {
            Output::Stdout(blob) | Output::Stderr(blob) => blob,
        }
    }
}

/// Which output stream(s) a subscriber wants.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputKind {
    Stdout,
    Stderr,
    All,
}
