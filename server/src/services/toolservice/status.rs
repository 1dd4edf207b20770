use crate::services::tools::ToolError;
use proclib::{ExitReason, ProcessInfo, ProcessStatus};
use protobuf::process_info::{
    failed_type::Reason, CompletedType, FailedType, RunningType, Status as WireStatus,
};
use tonic::Status;
use tracing::warn;

/// Map a supervisor error onto the gRPC status callers see.
pub fn from_process_error(err: proclib::Error) -> Status {
    use proclib::Error::*;
    let message = err.to_string();
    match err {
        NotFound(_) => Status::not_found(message),
        InvalidCommand | InvalidArgs { .. } => Status::invalid_argument(message),
        OutputNotCaptured(_) => Status::failed_precondition(message),
        TerminationTimeout { .. } => {
            warn!(error = %message, "termination timed out");
            Status::deadline_exceeded(message)
        }
        Spawn { .. } | Poll { .. } | TerminationFailed { .. } => {
            warn!(error = %message, "process operation failed");
            Status::internal(message)
        }
        SupervisorGone => Status::unavailable(message),
    }
}

pub fn from_tool_error(err: ToolError) -> Status {
    let message = err.to_string();
    match err {
        ToolError::UnknownTool(_) | ToolError::NotFound(_) => Status::not_found(message),
        ToolError::MissingArgument { .. } | ToolError::InvalidArgument { .. } => {
            Status::invalid_argument(message)
        }
        ToolError::NotConfigured { .. } => Status::failed_precondition(message),
        ToolError::Process(err) => from_process_error(err),
    }
}

pub fn to_wire(info: ProcessInfo) -> protobuf::ProcessInfo {
    let status = match info.status {
        ProcessStatus::Running => WireStatus::Running(RunningType {}),
        ProcessStatus::Completed => WireStatus::Completed(CompletedType {}),
        ProcessStatus::Failed(reason) => WireStatus::Failed(FailedType {
            reason: Some(match reason {
                ExitReason::ExitCode(code) => Reason::ExitCode(code),
                ExitReason::Signal(signal) => Reason::Signal(signal),
            }),
        }),
    };
    protobuf::ProcessInfo {
        process_id: info.id.to_string(),
        pid: info.pid,
        command: info.command,
        args: info.args,
        started_at: info.started_at.to_rfc3339(),
        status: Some(status),
    }
}
