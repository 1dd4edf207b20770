use crate::types::ProcessId;
use std::{io, result, time::Duration};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("no process with id {0}")]
    NotFound(ProcessId),
    #[error("command must not be empty")]
    InvalidCommand,
    #[error("could not split arguments `{args}`: {reason}")]
    InvalidArgs { args: String, reason: String },
    #[error("failed to poll process {id}: {source}")]
    Poll {
        id: ProcessId,
        #[source]
        source: io::Error,
    },
    #[error("failed to terminate process {id}: {source}")]
    TerminationFailed {
        id: ProcessId,
        #[source]
        source: io::Error,
    },
    #[error("process {id} still alive {waited:?} after being killed")]
    TerminationTimeout { id: ProcessId, waited: Duration },
    #[error("output of process {0} is not captured")]
    OutputNotCaptured(ProcessId),
    #[error("process supervisor has shut down")]
    SupervisorGone,
}

pub type Result<T> = result::Result<T, Error>;
