mod status;

use self::status::{from_process_error, from_tool_error, to_wire};
use crate::services::tools::ToolBox;
use futures::Stream;
use proclib::{CommandSpec, OutputKind, ProcessId, ProcessSupervisor};
use protobuf::output_request::OutputType;
use protobuf::tools_server::Tools;
use protobuf::{
    KillRequest, KillResponse, ListRequest, ListResponse, OutputRequest, OutputResponse,
    RunRequest, RunResponse, StatusRequest, StatusResponse, ToolRequest, ToolResponse,
};
use std::path::PathBuf;
use std::pin::Pin;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;
use tonic::{Request, Response, Status};
use tracing::info;
use uuid::Uuid;

// tonic wraps this in Arc anyway internally, so we don't need Arc
pub struct ToolService {
    supervisor: ProcessSupervisor,
    tools: ToolBox,
}

impl ToolService {
    pub fn new(supervisor: ProcessSupervisor, tools: ToolBox) -> Self {
        Self { supervisor, tools }
    }
}

/// Process ids are opaque to callers, so a malformed one is simply one we don't know.
fn parse_process_id(process_id: &str) -> Result<ProcessId, Status> {
    Uuid::parse_str(process_id)
        .map_err(|_| Status::not_found(format!("no process with id {}", process_id)))
}

#[tonic::async_trait]
impl Tools for ToolService {
    type StreamOutputStream = Pin<Box<dyn Stream<Item = Result<OutputResponse, Status>> + Send>>;

    async fn run_command(
        &self,
        req: Request<RunRequest>,
    ) -> Result<Response<RunResponse>, Status> {
        let RunRequest {
            command,
            args,
            envs,
            working_dir,
            stream_output,
        } = req.into_inner();

        let spec = CommandSpec {
            command,
            args,
            env: envs,
            working_dir: Some(working_dir)
                .filter(|dir| !dir.is_empty())
                .map(PathBuf::from),
            stream_output,
        };
        let spawned = self
            .supervisor
            .spawn(spec)
            .await
            .map_err(from_process_error)?;
        info!(process_id = %spawned.id, pid = spawned.pid, "run_command");

        Ok(Response::new(RunResponse {
            process_id: spawned.id.to_string(),
            pid: spawned.pid,
        }))
    }

    async fn query_status(
        &self,
        req: Request<StatusRequest>,
    ) -> Result<Response<StatusResponse>, Status> {
        let id = parse_process_id(&req.get_ref().process_id)?;
        let info = self
            .supervisor
            .describe(id)
            .await
            .map_err(from_process_error)?;
        Ok(Response::new(StatusResponse {
            process: Some(to_wire(info)),
        }))
    }

    async fn kill_process(
        &self,
        req: Request<KillRequest>,
    ) -> Result<Response<KillResponse>, Status> {
        let id = parse_process_id(&req.get_ref().process_id)?;
        self.supervisor.kill(id).await.map_err(from_process_error)?;
        info!(process_id = %id, "kill_process");
        Ok(Response::new(KillResponse {})) // empty response on success
    }

    async fn list_processes(
        &self,
        _req: Request<ListRequest>,
    ) -> Result<Response<ListResponse>, Status> {
        let processes = self.supervisor.list().await.map_err(from_process_error)?;
        Ok(Response::new(ListResponse {
            processes: processes.into_iter().map(to_wire).collect(),
        }))
    }

    async fn stream_output(
        &self,
        req: Request<OutputRequest>,
    ) -> Result<Response<Self::StreamOutputStream>, Status> {
        let id = parse_process_id(&req.get_ref().process_id)?;
        let kind = match req.get_ref().output() {
            OutputType::Stdout => OutputKind::Stdout,
            OutputType::Stderr => OutputKind::Stderr,
            OutputType::All => OutputKind::All,
        };
        let receiver = self
            .supervisor
            .stream_output(id, kind)
            .await
            .map_err(from_process_error)?;

        let output_stream = UnboundedReceiverStream::new(receiver);
        let response_stream = output_stream.map(|blob| {
            Ok(OutputResponse {
                data: blob.to_vec(),
            })
        });
        Ok(Response::new(
            Box::pin(response_stream) as Self::StreamOutputStream
        ))
    }

    async fn call_tool(
        &self,
        req: Request<ToolRequest>,
    ) -> Result<Response<ToolResponse>, Status> {
        let ToolRequest { name, arguments } = req.into_inner();
        let content = self
            .tools
            .call(&name, &arguments)
            .await
            .map_err(from_tool_error)?;
        Ok(Response::new(ToolResponse { content }))
    }
}
