use crate::events::ProcessStatus;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::PathBuf;
use uuid::Uuid;

pub type Program = String;
pub type Args = String;
pub type Envs = HashMap<String, String>;
pub type ProcessId = Uuid;
pub type Pid = u32;
pub type OutputBlob = bytes::Bytes;

/// A command to run through the configured package runner.
///
/// The runner program itself is not chosen here, it comes from the supervisor's
/// [`SupervisorConfig`](crate::SupervisorConfig) so end callers can only choose what the runner executes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandSpec {
    /// the package or binary handed to the runner
    pub command: String,
    /// shell-style arguments appended after the command
    pub args: Args,
    /// merged over the supervisor's own environment
    pub env: Envs,
    /// defaults to the supervisor's working directory
    pub working_dir: Option<PathBuf>,
    /// capture stdout/stderr so they can be streamed later
    pub stream_output: bool,
}

impl CommandSpec {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    pub fn args(mut self, args: impl Into<Args>) -> Self {
        self.args = args.into();
        self
    }

    pub fn env(mut self, key: impl Into<String>, val: impl Into<String>) -> Self {
        self.env.insert(key.into(), val.into());
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn stream_output(mut self, stream: bool) -> Self {
        self.stream_output = stream;
        self
    }
}

/// Returned by a successful spawn.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Spawned {
    pub id: ProcessId,
    pub pid: Pid,
}

/// A point-in-time view of a supervised process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessInfo {
    pub id: ProcessId,
    pub pid: Pid,
    pub command: String,
    pub args: Args,
    pub started_at: DateTime<Utc>,
    pub status: ProcessStatus,
}
