use protobuf::{
    output_request::OutputType,
    process_info::{failed_type::Reason, Status as ProcessStatus},
    tools_client::ToolsClient,
    KillRequest, ListRequest, OutputRequest, OutputResponse, ProcessInfo, RunRequest,
    StatusRequest, ToolRequest,
};
use std::collections::HashMap;
use std::error;
use tonic::{
    codegen::InterceptedService,
    metadata::{Ascii, MetadataValue},
    service::Interceptor,
    transport::Channel,
    Request, Status,
};

/// Attaches `authorization: Bearer <token>` to every request when a token is set.
#[derive(Clone)]
pub struct BearerToken {
    value: Option<MetadataValue<Ascii>>,
}

impl Interceptor for BearerToken {
    fn call(&mut self, mut req: Request<()>) -> Result<Request<()>, Status> {
        if let Some(value) = &self.value {
            req.metadata_mut().insert("authorization", value.clone());
        }
        Ok(req)
    }
}

pub struct ClientCli {
    inner: ToolsClient<InterceptedService<Channel, BearerToken>>,
}

impl ClientCli {
    pub async fn connect(
        server_addr: &str,
        token: Option<&str>,
    ) -> Result<Self, Box<dyn error::Error>> {
        let value: Option<MetadataValue<Ascii>> = match token {
            Some(token) => Some(format!("Bearer {}", token).parse()?),
            None => None,
        };
        let channel = Channel::from_shared(server_addr.to_string())?
            .connect()
            .await?;
        Ok(Self {
            inner: ToolsClient::with_interceptor(channel, BearerToken { value }),
        })
    }

    pub async fn run(
        &mut self,
        command: &str,
        args: &str,
        dir: Option<&str>,
        envs: &[(String, String)],
        stream_output: bool,
    ) -> Result<(), Status> {
        let request = Request::new(RunRequest {
            command: command.into(),
            args: args.into(),
            envs: HashMap::from_iter(envs.iter().cloned()),
            working_dir: dir.unwrap_or_default().into(),
            stream_output,
        });
        let response = self.inner.run_command(request).await?.into_inner();
        println!("Started process id: {} (pid {})", response.process_id, response.pid);
        Ok(())
    }

    pub async fn kill(&mut self, process_id: String) -> Result<(), Status> {
        let request = Request::new(KillRequest {
            process_id: process_id.clone(),
        });
        self.inner.kill_process(request).await?;
        println!("Killed process id: {}", process_id);
        Ok(())
    }

    pub async fn query_status(&mut self, process_id: String) -> Result<(), Status> {
        let response = self
            .inner
            .query_status(Request::new(StatusRequest { process_id }))
            .await?;
        match response.into_inner().process {
            Some(process) => print_process(&process),
            None => println!("Server returned no process info"),
        }
        Ok(())
    }

    pub async fn list(&mut self) -> Result<(), Status> {
        let processes = self
            .inner
            .list_processes(Request::new(ListRequest {}))
            .await?
            .into_inner()
            .processes;
        if processes.is_empty() {
            println!("No supervised processes");
        }
        for process in &processes {
            print_process(process);
        }
        Ok(())
    }

    /// Stream the requested output until the process closes it
    pub async fn stream_output(
        &mut self,
        process_id: String,
        output: OutputType,
    ) -> Result<(), Status> {
        let request = Request::new(OutputRequest {
            process_id,
            output: output.into(),
        });
        let mut stream = self.inner.stream_output(request).await?.into_inner();
        while let Some(OutputResponse { data }) = stream.message().await? {
            print!("{}", String::from_utf8_lossy(&data));
        }
        Ok(())
    }

    pub async fn call_tool(
        &mut self,
        name: String,
        arguments: Vec<(String, String)>,
    ) -> Result<(), Status> {
        let request = Request::new(ToolRequest {
            name,
            arguments: arguments.into_iter().collect(),
        });
        let response = self.inner.call_tool(request).await?;
        println!("{}", response.into_inner().content);
        Ok(())
    }
}

fn print_process(process: &ProcessInfo) {
    let status = match &process.status {
        Some(ProcessStatus::Running(_)) => "running".to_string(),
        Some(ProcessStatus::Completed(_)) => "completed".to_string(),
        Some(ProcessStatus::Failed(failed)) => match failed.reason {
            Some(Reason::ExitCode(code)) => format!("failed, exit code {}", code),
            Some(Reason::Signal(signal)) => format!("failed, killed by signal {}", signal),
            None => "failed".to_string(),
        },
        None => "unknown".to_string(),
    };
    println!(
        "{}  pid {}  {}  started {}  {} {}",
        process.process_id, process.pid, status, process.started_at, process.command, process.args
    );
}
