mod arg_parser;
mod client_cli;

use arg_parser::{ArgParser, SubCommand};
use client_cli::ClientCli;
use protobuf::output_request;

use clap::Parser;
use std::error;

#[tokio::main]
async fn main() -> Result<(), Box<dyn error::Error>> {
    let args = ArgParser::parse();
    let mut client = ClientCli::connect(&args.server, args.token.as_deref()).await?;

    match args.sub_command {
        SubCommand::Run {
            command,
            args,
            dir,
            envs,
            stream,
        } => {
            client
                .run(&command, &args, dir.as_deref(), &envs, stream)
                .await?;
        }
        SubCommand::Kill { process_id } => {
            client.kill(process_id).await?;
        }
        SubCommand::Status { process_id } => {
            client.query_status(process_id).await?;
        }
        SubCommand::List => {
            client.list().await?;
        }
        SubCommand::Output {
            process_id,
            output_type,
        } => {
            let output_type = match output_type {
                arg_parser::OutputType::Stdout => output_request::OutputType::Stdout,
                arg_parser::OutputType::Stderr => output_request::OutputType::Stderr,
                arg_parser::OutputType::All => output_request::OutputType::All,
            };
            client.stream_output(process_id, output_type).await?
        }
        SubCommand::Tool { name, arguments } => {
            client.call_tool(name, arguments).await?;
        }
    }

    Ok(())
}
