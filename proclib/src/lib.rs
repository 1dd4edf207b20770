mod actors;
mod config;
pub mod error;
mod events;
mod invocation;
pub mod types;

// re-export the supervisor handle as if it is the supervisor itself.
pub use actors::supervisor::ProcessSupervisorHandle as ProcessSupervisor;
pub use config::SupervisorConfig;
pub use error::Error;
pub use events::{ExitReason, OutputKind, ProcessStatus};
pub use invocation::Invocation;
pub use types::{CommandSpec, ProcessId, ProcessInfo, Spawned};
