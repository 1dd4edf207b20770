use crate::error::ServerError;
use clap::Parser;
use proclib::SupervisorConfig;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tonic::transport::{Certificate, Identity, ServerTlsConfig};

/// Serve package-runner supervision and tool calls over gRPC
///
/// Every option can also be set through its environment variable or a `.env` file.
#[derive(Clone, Debug, Parser)]
#[clap(name = "server")]
pub struct ServerConfig {
    /// Address to listen on
    #[clap(long, env = "TOOLSERVER_ADDR", default_value = "[::1]:50051")]
    pub addr: SocketAddr,

    /// Package runner used for every command
    #[clap(long, env = "TOOLSERVER_RUNNER", default_value = "npx")]
    pub runner: String,

    /// Flag passed to the runner before the command, keeps it from prompting
    #[clap(
        long,
        env = "TOOLSERVER_RUNNER_FLAG",
        default_value = "-y",
        allow_hyphen_values = true
    )]
    pub runner_flag: String,

    /// Milliseconds a process gets to exit after SIGTERM before SIGKILL
    #[clap(long, env = "TOOLSERVER_KILL_GRACE_MS", default_value = "5000")]
    pub kill_grace_ms: u64,

    /// Milliseconds to wait for a process to disappear after SIGKILL
    #[clap(long, env = "TOOLSERVER_KILL_TIMEOUT_MS", default_value = "5000")]
    pub kill_timeout_ms: u64,

    /// Capacity of the supervisor's request queue
    #[clap(long, env = "TOOLSERVER_CHANNEL_CAPACITY", default_value = "64")]
    pub channel_capacity: usize,

    /// Bytes of captured output kept per process for replaying to late subscribers
    #[clap(long, env = "TOOLSERVER_OUTPUT_BUFFER_BYTES", default_value = "1048576")]
    pub output_buffer_bytes: usize,

    /// Require `authorization: Bearer <token>` on every request
    #[clap(long, env = "TOOLSERVER_API_TOKEN", hide_env_values = true)]
    pub api_token: Option<String>,

    /// PEM certificate, enables TLS together with --tls-key
    #[clap(long, env = "TOOLSERVER_TLS_CERT")]
    pub tls_cert: Option<PathBuf>,

    /// PEM private key for --tls-cert
    #[clap(long, env = "TOOLSERVER_TLS_KEY")]
    pub tls_key: Option<PathBuf>,

    /// PEM CA used to verify client certificates (mutual TLS)
    #[clap(long, env = "TOOLSERVER_TLS_CLIENT_CA")]
    pub tls_client_ca: Option<PathBuf>,

    /// Token handed to the GitHub MCP server
    #[clap(long, env = "GITHUB_PERSONAL_ACCESS_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// Host the GitHub MCP server advertises in its base url
    #[clap(long, env = "IP_HOST", default_value = "0.0.0.0")]
    pub public_host: String,

    /// Port for the GitHub MCP server
    #[clap(long, env = "GITHUB_PORT", default_value = "8002")]
    pub github_port: u16,
}

impl ServerConfig {
    /// Parse flags and environment, after loading `.env` if there is one.
    pub fn load() -> Self {
        let _ = dotenvy::dotenv();
        Self::parse()
    }

    pub fn supervisor(&self) -> SupervisorConfig {
        SupervisorConfig {
            channel_capacity: self.channel_capacity,
            output_buffer_limit: self.output_buffer_bytes,
            ..SupervisorConfig::default()
        }
        .with_runner(&self.runner, &self.runner_flag)
        .with_kill_timeouts(
            Duration::from_millis(self.kill_grace_ms),
            Duration::from_millis(self.kill_timeout_ms),
        )
    }

    /// TLS settings, or `None` to serve plaintext.
    pub async fn tls(&self) -> Result<Option<ServerTlsConfig>, ServerError> {
        let (cert, key) = match (&self.tls_cert, &self.tls_key) {
            (Some(cert), Some(key)) => (cert, key),
            (None, None) => {
                if self.tls_client_ca.is_some() {
                    return Err(ServerError::Config(
                        "--tls-client-ca requires --tls-cert and --tls-key".into(),
                    ));
                }
                return Ok(None);
            }
            _ => {
                return Err(ServerError::Config(
                    "--tls-cert and --tls-key must be given together".into(),
                ))
            }
        };

        let identity = Identity::from_pem(read_pem(cert).await?, read_pem(key).await?);
        let mut tls = ServerTlsConfig::new().identity(identity);
        if let Some(ca) = &self.tls_client_ca {
            tls = tls.client_ca_root(Certificate::from_pem(read_pem(ca).await?));
        }
        Ok(Some(tls))
    }
}

async fn read_pem(path: &Path) -> Result<Vec<u8>, ServerError> {
    tokio::fs::read(path)
        .await
        .map_err(|source| ServerError::Read {
            path: path.to_path_buf(),
            source,
        })
}
