use clap::{ArgEnum, Parser, Subcommand};

/// Talk to a tool server: run and supervise package-runner commands, or call a tool
#[derive(Debug, Parser)]
pub struct ArgParser {
    /// The address of the server, e.g. http://[::1]:50051
    #[clap(short = 's', long = "server", env = "TOOLSERVER_URL")]
    pub server: String,
    /// Bearer token, if the server requires one
    #[clap(long, env = "TOOLSERVER_API_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
    /// The sub-command to use
    #[clap(subcommand)]
    pub sub_command: SubCommand,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Subcommand)]
pub enum SubCommand {
    /// run a command through the server's package runner
    Run {
        #[clap(long)]
        /// package or binary to run
        command: String,

        #[clap(long, default_value = "", allow_hyphen_values = true)]
        /// arguments for the command, as one shell-style string
        args: String,

        #[clap(long)]
        /// working directory for the command
        dir: Option<String>,

        #[clap(long = "env", multiple_occurrences = true, parse(try_from_str = var_eq_val))]
        /// environment variable as VAR=VAL, may be repeated
        envs: Vec<(String, String)>,

        #[clap(long)]
        /// capture output so it can be streamed later
        stream: bool,
    },
    /// kill a process
    Kill {
        /// process id returned by `run`
        process_id: String,
    },
    /// get a process's status
    Status {
        /// process id returned by `run`
        process_id: String,
    },
    /// list every supervised process
    List,
    /// stream a process's output
    Output {
        /// type of output to stream
        #[clap(arg_enum)]
        output_type: OutputType,

        /// process id returned by `run`
        process_id: String,
    },
    /// call one of the server's tools
    Tool {
        /// tool name, e.g. get_weather
        name: String,

        /// tool arguments as KEY=VALUE
        #[clap(parse(try_from_str = var_eq_val))]
        arguments: Vec<(String, String)>,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, ArgEnum)]
pub enum OutputType {
    /// stream stdout
    Stdout,
    /// stream stderr
    Stderr,
    /// stream stdout and stderr
    All,
}

/// try_from_str parse function for VAR=VAL pairs. The value may itself contain `=`.
fn var_eq_val(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((var, val)) if !var.is_empty() => Ok((var.to_string(), val.to_string())),
        _ => Err("Required format is VAR=VAL".to_string()),
    }
}
