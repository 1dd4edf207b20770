mod config;
mod error;
mod interceptors;
mod services;

use config::ServerConfig;
use error::ServerError;
use interceptors::auth::BearerAuth;
use proclib::ProcessSupervisor;
use protobuf::tools_server::ToolsServer;
use services::toolservice::ToolService;
use services::tools::{GithubSettings, ToolBox};
use futures::future;
use std::future::Future;
use std::io;
#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};
use tonic::transport::Server;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = ServerConfig::load();
    serve(config, shutdown_signal()?).await?;
    Ok(())
}

/// Resolves on Ctrl-C, or on SIGTERM where there is one.
///
/// The SIGTERM handler is installed before this returns, so the signal is not lost to its default action.
#[cfg(unix)]
fn shutdown_signal() -> io::Result<impl Future<Output = ()>> {
    let mut terminate = signal(SignalKind::terminate())?;
    Ok(async move {
        tokio::select! {
            _ = ctrl_c() => info!("received Ctrl-C"),
            _ = terminate.recv() => info!("received SIGTERM"),
        }
    })
}

#[cfg(not(unix))]
fn shutdown_signal() -> io::Result<impl Future<Output = ()>> {
    Ok(async {
        ctrl_c().await;
        info!("received Ctrl-C");
    })
}

/// Only resolves on an actual Ctrl-C. Failing to listen must not read as a request to stop.
async fn ctrl_c() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "cannot listen for Ctrl-C");
        future::pending::<()>().await;
    }
}

/// Serve until `shutdown` resolves, then kill every process still being supervised.
async fn serve(
    config: ServerConfig,
    shutdown: impl Future<Output = ()>,
) -> Result<(), ServerError> {
    let supervisor = ProcessSupervisor::start(config.supervisor());
    let tools = ToolBox::new(
        supervisor.clone(),
        GithubSettings {
            token: config.github_token.clone(),
            host: config.public_host.clone(),
            port: config.github_port,
        },
    );
    let tool_service = ToolService::new(supervisor.clone(), tools);
    let tools_server =
        ToolsServer::with_interceptor(tool_service, BearerAuth::new(config.api_token.clone()));

    let mut builder = Server::builder();
    if let Some(tls_config) = config.tls().await? {
        builder = builder.tls_config(tls_config)?;
        info!("TLS enabled");
    }
    info!(addr = %config.addr, runner = %config.runner, "listening");

    builder
        .add_service(tools_server)
        .serve_with_shutdown(config.addr, shutdown)
        .await?;

    info!("stopping supervised processes");
    supervisor.shutdown().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use protobuf::output_request::OutputType;
    use protobuf::process_info::{failed_type::Reason, Status as WireStatus};
    use protobuf::tools_client::ToolsClient;
    use protobuf::{
        KillRequest, ListRequest, OutputRequest, OutputResponse, RunRequest, StatusRequest,
        ToolRequest,
    };
    use std::collections::HashMap;
    use std::time::Duration;
    use tonic::transport::Channel;
    use tonic::metadata::{Ascii, MetadataValue};
    use tonic::Code;

    // start the server with `sh -c` as the runner, so commands are shell snippets
    async fn start_server(addr: &'static str, extra: &[&str]) {
        let mut args = vec![
            "server",
            "--addr",
            addr,
            "--runner",
            "sh",
            "--runner-flag=-c",
            "--kill-grace-ms",
            "500",
        ];
        args.extend_from_slice(extra);
        let config = ServerConfig::parse_from(args);
        tokio::spawn(async move {
            let _ = serve(config, futures::future::pending()).await;
        });
    }

    async fn connect(addr: &'static str) -> Channel {
        let endpoint = Channel::from_shared(format!("http://{}", addr)).expect("endpoint");
        // retry until the server is up
        for _ in 0..50 {
            if let Ok(channel) = endpoint.connect().await {
                return channel;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        panic!("server at {} never came up", addr);
    }

    async fn build_client(addr: &'static str) -> ToolsClient<Channel> {
        ToolsClient::new(connect(addr).await)
    }

    fn run_request(command: &str, stream_output: bool) -> RunRequest {
        RunRequest {
            command: command.into(),
            args: String::new(),
            envs: HashMap::new(),
            working_dir: String::new(),
            stream_output,
        }
    }

    async fn wait_for_exit(
        client: &mut ToolsClient<Channel>,
        process_id: &str,
    ) -> WireStatus {
        for _ in 0..250 {
            let process = client
                .query_status(StatusRequest {
                    process_id: process_id.into(),
                })
                .await
                .expect("status")
                .into_inner()
                .process
                .expect("process info");
            match process.status.expect("status") {
                WireStatus::Running(_) => {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                }
                status => return status,
            }
        }
        panic!("process {} did not exit", process_id);
    }

    #[tokio::test]
    async fn run_status_kill() {
        let addr = "127.0.0.1:50061";
        start_server(addr, &[]).await;
        let mut client = build_client(addr).await;

        let response = client
            .run_command(run_request("sleep 30", false))
            .await
            .expect("run")
            .into_inner();
        assert!(response.pid > 0);

        let process = client
            .query_status(StatusRequest {
                process_id: response.process_id.clone(),
            })
            .await
            .expect("status")
            .into_inner()
            .process
            .expect("process info");
        assert!(matches!(process.status, Some(WireStatus::Running(_))));
        assert_eq!(process.command, "sleep 30");

        client
            .kill_process(KillRequest {
                process_id: response.process_id.clone(),
            })
            .await
            .expect("kill");
        let status = client
            .query_status(StatusRequest {
                process_id: response.process_id.clone(),
            })
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::NotFound);
        let status = client
            .kill_process(KillRequest {
                process_id: response.process_id,
            })
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::NotFound);
    }

    #[tokio::test]
    async fn exit_codes_are_reported() {
        let addr = "127.0.0.1:50062";
        start_server(addr, &[]).await;
        let mut client = build_client(addr).await;

        let ok = client
            .run_command(run_request("exit 0", false))
            .await
            .unwrap()
            .into_inner();
        assert!(matches!(
            wait_for_exit(&mut client, &ok.process_id).await,
            WireStatus::Completed(_)
        ));

        let failed = client
            .run_command(run_request("exit 3", false))
            .await
            .unwrap()
            .into_inner();
        match wait_for_exit(&mut client, &failed.process_id).await {
            WireStatus::Failed(failed) => assert_eq!(failed.reason, Some(Reason::ExitCode(3))),
            other => panic!("expected failure, got {:?}", other),
        }

        let listed = client
            .list_processes(ListRequest {})
            .await
            .unwrap()
            .into_inner()
            .processes;
        assert_eq!(listed.len(), 2);
    }

    #[tokio::test]
    async fn bad_requests() {
        let addr = "127.0.0.1:50063";
        start_server(addr, &[]).await;
        let mut client = build_client(addr).await;

        let status = client
            .query_status(StatusRequest {
                process_id: "not-a-process".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::NotFound);

        let status = client
            .run_command(run_request("", false))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::InvalidArgument);
    }

    #[tokio::test]
    async fn stream_output() {
        let addr = "127.0.0.1:50064";
        start_server(addr, &[]).await;
        let mut client = build_client(addr).await;

        let mut request = run_request(r#"printf "$1""#, true);
        request.args = "zero 'hello alice'".into();
        let process_id = client.run_command(request).await.unwrap().into_inner().process_id;

        let mut stream = client
            .stream_output(OutputRequest {
                process_id,
                output: OutputType::All.into(),
            })
            .await
            .expect("no stream response")
            .into_inner();
        let mut received = vec![];
        while let Some(OutputResponse { data }) = stream.message().await.unwrap() {
            received.extend_from_slice(&data);
        }
        assert_eq!("hello alice", String::from_utf8_lossy(&received));
    }

    #[tokio::test]
    async fn call_tool() {
        let addr = "127.0.0.1:50065";
        start_server(addr, &[]).await;
        let mut client = build_client(addr).await;

        let content = client
            .call_tool(ToolRequest {
                name: "get_weather".into(),
                arguments: HashMap::from([("city".to_string(), "Seoul".to_string())]),
            })
            .await
            .unwrap()
            .into_inner()
            .content;
        assert!(content.starts_with("City: Seoul"));

        let status = client
            .call_tool(ToolRequest {
                name: "nope".into(),
                arguments: HashMap::new(),
            })
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::NotFound);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn sigterm_stops_the_server_and_its_processes() {
        let addr = "127.0.0.1:50067";
        let config = ServerConfig::parse_from([
            "server",
            "--addr",
            addr,
            "--runner",
            "sh",
            "--runner-flag=-c",
            "--kill-grace-ms",
            "500",
        ]);
        let server = tokio::spawn(serve(config, shutdown_signal().expect("SIGTERM handler")));
        let mut client = build_client(addr).await;
        let pid = client
            .run_command(run_request("sleep 30", false))
            .await
            .expect("run")
            .into_inner()
            .pid;

        // SAFETY: kill(2) takes plain integers; our own SIGTERM handler is already installed
        let ret = unsafe { libc::kill(std::process::id() as libc::pid_t, libc::SIGTERM) };
        assert_eq!(ret, 0);

        tokio::time::timeout(Duration::from_secs(10), server)
            .await
            .expect("server did not shut down")
            .expect("join")
            .expect("serve");
        // the child was killed and reaped, so its pid is free
        let ret = unsafe { libc::kill(pid as libc::pid_t, 0) };
        assert_eq!(ret, -1);
    }

    #[tokio::test]
    async fn unauthenticated_user() {
        let addr = "127.0.0.1:50066";
        start_server(addr, &["--api-token", "s3cret"]).await;
        let channel = connect(addr).await;

        let mut anonymous = ToolsClient::new(channel.clone());
        let status = anonymous
            .list_processes(ListRequest {})
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::Unauthenticated);

        let token: MetadataValue<Ascii> = "Bearer s3cret".parse().unwrap();
        let mut authenticated =
            ToolsClient::with_interceptor(channel, move |mut req: tonic::Request<()>| {
                req.metadata_mut().insert("authorization", token.clone());
                Ok(req)
            });
        let listed = authenticated
            .list_processes(ListRequest {})
            .await
            .expect("authenticated list");
        assert!(listed.into_inner().processes.is_empty());
    }
}
