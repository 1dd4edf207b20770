use crate::config::SupervisorConfig;
use crate::error::{Error, Result};
use crate::types::CommandSpec;
use std::fmt;
use std::process::Stdio;
use tokio::process;

/// The concrete program and argv a [`CommandSpec`] turns into.
///
/// Arguments are split with shell quoting rules but never handed to a shell,
/// so `args` like `"; rm -rf ~"` reach the runner as plain arguments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub argv: Vec<String>,
}

impl Invocation {
    pub fn compose(config: &SupervisorConfig, spec: &CommandSpec) -> Result<Self> {
        if spec.command.trim().is_empty() {
            return Err(Error::InvalidCommand);
        }
        let extra = shell_words::split(&spec.args).map_err(|err| Error::InvalidArgs {
            args: spec.args.clone(),
            reason: err.to_string(),
        })?;

        let mut argv = Vec::with_capacity(extra.len() + 2);
        if !config.runner_flag.is_empty() {
            argv.push(config.runner_flag.clone());
        }
        argv.push(spec.command.clone());
        argv.extend(extra);

        Ok(Self {
            program: config.program.clone(),
            argv,
        })
    }

    /// Build the OS command. The child inherits our environment with `spec.env` layered on top.
    pub fn command(&self, spec: &CommandSpec) -> process::Command {
        let mut command = process::Command::new(&self.program);
        command
            .args(&self.argv)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &spec.working_dir {
            command.current_dir(dir);
        }
        if spec.stream_output {
            command.stdout(Stdio::piped()).stderr(Stdio::piped());
        } else {
            command.stdout(Stdio::null()).stderr(Stdio::null());
        }
        own_process_group(&mut command);
        command
    }
}

/// Put the child at the head of a new process group, so whatever the runner forks can be
/// signalled together with it.
#[cfg(unix)]
fn own_process_group(command: &mut process::Command) {
    // SAFETY: setpgid is async-signal-safe and only touches the forked child
    unsafe {
        command.pre_exec(|| {
            if libc::setpgid(0, 0) == 0 {
                Ok(())
            } else {
                Err(std::io::Error::last_os_error())
            }
        });
    }
}

#[cfg(not(unix))]
fn own_process_group(_command: &mut process::Command) {}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let line = std::iter::once(&self.program).chain(self.argv.iter());
        write!(f, "{}", shell_words::join(line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runner_flag_then_command_then_args() {
        let spec = CommandSpec::new("@modelcontextprotocol/server-github").args("--port 8002");
        let invocation = Invocation::compose(&SupervisorConfig::default(), &spec).unwrap();
        assert_eq!(invocation.program, "npx");
        assert_eq!(
            invocation.argv,
            vec!["-y", "@modelcontextprotocol/server-github", "--port", "8002"]
        );
    }

    #[test]
    fn quoted_args_stay_together() {
        let spec = CommandSpec::new("just-aii-guess")
            .args(r#"--stdio "npx -y @modelcontextprotocol/server-github" --ssePath /sse"#);
        let invocation = Invocation::compose(&SupervisorConfig::default(), &spec).unwrap();
        assert_eq!(
            invocation.argv,
            vec![
                "-y",
                "just-aii-guess",
                "--stdio",
                "npx -y @modelcontextprotocol/server-github",
                "--ssePath",
                "/sse"
            ]
        );
    }

    #[test]
    fn shell_metacharacters_are_not_interpreted() {
        let spec = CommandSpec::new("pkg").args("a; echo pwned | cat");
        let invocation = Invocation::compose(&SupervisorConfig::default(), &spec).unwrap();
        assert_eq!(
            invocation.argv,
            vec!["-y", "pkg", "a;", "echo", "pwned", "|", "cat"]
        );
    }

    #[test]
    fn empty_runner_flag_is_skipped() {
        let config = SupervisorConfig::default().with_runner("sh", "");
        let invocation = Invocation::compose(&config, &CommandSpec::new("true")).unwrap();
        assert_eq!(invocation.argv, vec!["true"]);
    }

    #[test]
    fn empty_command_is_rejected() {
        let err = Invocation::compose(&SupervisorConfig::default(), &CommandSpec::new("  "))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidCommand));
    }

    #[test]
    fn unbalanced_quotes_are_rejected() {
        let spec = CommandSpec::new("pkg").args("--name 'oops");
        let err = Invocation::compose(&SupervisorConfig::default(), &spec).unwrap_err();
        assert!(matches!(err, Error::InvalidArgs { .. }));
    }

    #[test]
    fn display_requotes() {
        let spec = CommandSpec::new("pkg").args("'a b'");
        let invocation = Invocation::compose(&SupervisorConfig::default(), &spec).unwrap();
        assert_eq!(invocation.to_string(), "npx -y pkg 'a b'");
    }
}
