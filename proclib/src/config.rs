use std::time::Duration;

/// Knobs for a [`ProcessSupervisor`](crate::ProcessSupervisor).
#[derive(Clone, Debug)]
pub struct SupervisorConfig {
    /// The package runner every command goes through, `npx` by default.
    pub program: String,
    /// Flag that keeps the runner from prompting. Skipped when empty.
    pub runner_flag: String,
    /// How long a process gets to exit after SIGTERM before it is sent SIGKILL.
    /// Zero sends SIGKILL straight away.
    pub kill_grace: Duration,
    /// How long to wait for the process to disappear after SIGKILL.
    pub kill_timeout: Duration,
    /// Capacity of the supervisor's inbound message queue.
    pub channel_capacity: usize,
    /// Bytes of captured output kept per process for replay. The oldest output is dropped first,
    /// so a late subscriber only sees the most recent output.
    pub output_buffer_limit: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            program: "npx".into(),
            runner_flag: "-y".into(),
            kill_grace: Duration::from_secs(5),
            kill_timeout: Duration::from_secs(5),
            channel_capacity: 64,
            output_buffer_limit: 1024 * 1024,
        }
    }
}

impl SupervisorConfig {
    pub fn with_runner(mut self, program: impl Into<String>, flag: impl Into<String>) -> Self {
        self.program = program.into();
        self.runner_flag = flag.into();
        self
    }

    pub fn with_kill_timeouts(mut self, grace: Duration, timeout: Duration) -> Self {
        self.kill_grace = grace;
        self.kill_timeout = timeout;
        self
    }
}
