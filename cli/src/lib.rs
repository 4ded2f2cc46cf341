//! Client side of the `drover` command-line tool
//!
//! [`Client`] turns each subcommand into one request to `droverd` and
//! renders the answer as lines of text.

pub mod error;

pub use error::{CliError, Result};

use ipc::IpcClient;
use schema::{ClientConfig, LogStream, Message, ProcessInfo, Response, StartRequest};
use std::time::Duration;
use tracing::debug;

/// CLI client for communicating with the daemon
#[derive(Debug)]
pub struct Client {
    ipc: IpcClient,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        let ipc = IpcClient::new(config.daemon_host, config.daemon_port)
            .with_timeout(Duration::from_secs(config.timeout_seconds));
        Self { ipc }
    }

    async fn call(&self, message: Message) -> Result<Response> {
        debug!("Sending {:?}", message);
        match self.ipc.send_message(&message).await? {
            Response::Error { message, code } => Err(CliError::Daemon { message, code }),
            response => Ok(response),
        }
    }

    async fn call_ok(&self, message: Message) -> Result<String> {
        match self.call(message).await? {
            Response::Ok { message } => Ok(message),
            other => Err(CliError::UnexpectedResponse(format!("{other:?}"))),
        }
    }

    /// Launch a new supervised process
    pub async fn start(
        &self,
        name: &str,
        command: &str,
        args: Vec<String>,
        restart_policy: &str,
    ) -> Result<String> {
        if name.trim().is_empty() {
            return Err(CliError::InvalidArgument("name cannot be empty".to_string()));
        }
        self.call_ok(Message::Start(StartRequest {
            name: name.to_string(),
            command: command.to_string(),
            args,
            restart_policy: restart_policy.to_string(),
        }))
        .await
    }

    pub async fn stop(&self, name: &str, force: bool) -> Result<String> {
        self.call_ok(Message::Stop {
            name: name.to_string(),
            force,
        })
        .await
    }

    pub async fn remove(&self, name: &str) -> Result<String> {
        self.call_ok(Message::Remove {
            name: name.to_string(),
        })
        .await
    }

    /// Rows for `drover list`
    pub async fn list(&self, verbose: bool) -> Result<Vec<String>> {
        match self.call(Message::List { verbose }).await? {
            Response::Processes { processes } if processes.is_empty() => {
                Ok(vec!["no processes".to_string()])
            }
            Response::Processes { processes } => Ok(processes
                .iter()
                .map(|p| format_process_row(p, verbose))
                .collect()),
            other => Err(CliError::UnexpectedResponse(format!("{other:?}"))),
        }
    }

    /// Stream captured output of `name`, handing each rendered line to `emit`
    pub async fn logs<F>(&self, name: &str, follow: bool, mut emit: F) -> Result<()>
    where
        F: FnMut(String),
    {
        self.ipc
            .stream_logs(name, follow, |text, stream| emit(format_log_line(text, stream)))
            .await
            .map_err(|e| match e {
                ipc::IpcError::Remote { message, code } => CliError::Daemon { message, code },
                other => other.into(),
            })
    }

    /// Lines for `drover status`
    pub async fn status(&self) -> Result<Vec<String>> {
        match self.call(Message::Status).await? {
            Response::Status {
                running,
                uptime_seconds,
                pid,
                process_count,
                version,
            } => {
                let mut lines = vec![
                    "Daemon Status:".to_string(),
                    format!("  Running: {}", running),
                    format!("  PID: {}", pid),
                    format!("  Uptime: {} seconds", uptime_seconds),
                    format!("  Processes: {}", process_count),
                ];
                if let Some(version) = version {
                    lines.push(format!("  Version: {}", version));
                }
                Ok(lines)
            }
            other => Err(CliError::UnexpectedResponse(format!("{other:?}"))),
        }
    }
}

/// One `list` row; verbose rows carry the extended fields the daemon sent
pub fn format_process_row(info: &ProcessInfo, verbose: bool) -> String {
    let mut row = format!(
        "name: {}, PID: {}, status: {}",
        info.name, info.pid, info.status
    );
    if !verbose {
        return row;
    }

    if let Some(policy) = info.restart_policy {
        row.push_str(&format!(", restart: {}", policy));
    }
    if let Some(restarts) = info.restarts {
        row.push_str(&format!(", restarts: {}", restarts));
    }
    if let Some(command) = &info.command {
        let mut line = command.clone();
        for arg in info.args.iter().flatten() {
            line.push(' ');
            line.push_str(arg);
        }
        row.push_str(&format!(", command: {}", line));
    }
    if let Some(started) = &info.started_at {
        row.push_str(&format!(", started: {}", started));
    }
    if let Some(err) = &info.last_exit_error {
        row.push_str(&format!(", last error: {}", err));
    }
    row
}

pub fn format_log_line(text: &str, stream: LogStream) -> String {
    match stream {
        LogStream::Stdout => text.to_string(),
        LogStream::Stderr => format!("[stderr] {}", text),
    }
}
