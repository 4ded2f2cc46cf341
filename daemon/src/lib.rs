//! Daemon library for drover
//!
//! [`Daemon`] serves the newline-delimited JSON protocol over TCP and routes
//! every request to the [`ProcessManager`] facade.

pub mod bootstrap;
pub mod error;

pub use error::{DaemonError, Result};

use drover_core::ProcessManager;
use schema::{DaemonConfig, Message, Response};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Notify, Semaphore};
use tracing::{debug, error, info, warn};

/// The main daemon server
#[derive(Debug, Clone)]
pub struct Daemon {
    config: DaemonConfig,
    manager: Arc<ProcessManager>,
    start_time: Instant,
    running: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
    connections: Arc<Semaphore>,
}

impl Daemon {
    /// Create a new daemon instance around an existing facade
    #[must_use]
    pub fn new(config: DaemonConfig, manager: Arc<ProcessManager>) -> Self {
        let max_connections = config.max_connections.max(1);
        Self {
            config,
            manager,
            start_time: Instant::now(),
            running: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(Notify::new()),
            connections: Arc::new(Semaphore::new(max_connections)),
        }
    }

    pub fn config(&self) -> &DaemonConfig {
        &self.config
    }

    pub fn manager(&self) -> &Arc<ProcessManager> {
        &self.manager
    }

    /// Bind the configured address
    ///
    /// # Errors
    /// Returns an error if the TCP listener cannot be bound.
    pub async fn bind(&self) -> Result<TcpListener> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        TcpListener::bind(&addr)
            .await
            .map_err(|e| DaemonError::ServerError(format!("Failed to bind to {addr}: {e}")))
    }

    /// Bind and serve until [`stop`](Self::stop) is called
    pub async fn start(&self) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Accept connections on `listener` until [`stop`](Self::stop) is called.
    ///
    /// At most `maxConnections` connections are handled at once; further
    /// clients wait in the listen backlog.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        self.running.store(true, Ordering::SeqCst);
        match listener.local_addr() {
            Ok(addr) => info!("Daemon listening on {}", addr),
            Err(e) => warn!("Daemon listening on unknown address: {}", e),
        }

        while self.running.load(Ordering::SeqCst) {
            let permit = tokio::select! {
                permit = self.connections.clone().acquire_owned() => permit
                    .map_err(|e| DaemonError::ServerError(e.to_string()))?,
                _ = self.shutdown.notified() => break,
            };

            let accepted = tokio::select! {
                accepted = listener.accept() => accepted,
                _ = self.shutdown.notified() => break,
            };

            match accepted {
                Ok((stream, addr)) => {
                    debug!("New connection from {}", addr);
                    let daemon = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = daemon.handle_connection(stream).await {
                            error!("Error handling connection from {}: {}", addr, e);
                        }
                        drop(permit);
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!("Daemon stopped accepting connections");
        Ok(())
    }

    /// Stop accepting connections
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.shutdown.notify_one();
    }

    /// Stop accepting connections and shut every supervised process down
    pub async fn shutdown(&self) {
        self.stop();
        self.manager.shutdown().await;
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Handle incoming connection
    async fn handle_connection(&self, stream: TcpStream) -> Result<()> {
        let (reader_half, mut writer_half) = stream.into_split();
        let mut reader = BufReader::new(reader_half);
        let mut frame = Vec::with_capacity(1024);
        // requests pipelined behind a log stream
        let mut pending = Vec::new();

        while next_frame(&mut reader, &mut pending, &mut frame).await? {
            if frame.is_empty() {
                continue;
            }

            let request: Message = match serde_json::from_slice(&frame) {
                Ok(request) => request,
                Err(e) => {
                    warn!("Rejecting malformed request: {}", e);
                    let response = Response::Error {
                        message: format!("Invalid request: {e}"),
                        code: Some("DAEMON004".to_string()),
                    };
                    ipc::write_json(&mut writer_half, &response).await?;
                    continue;
                }
            };

            match request {
                Message::Logs { name, follow } => {
                    if !self
                        .stream_logs(&name, follow, &mut reader, &mut pending, &mut writer_half)
                        .await?
                    {
                        debug!("Client disconnected while streaming logs of '{}'", name);
                        break;
                    }
                }
                other => {
                    let response = self.process_message(other).await;
                    ipc::write_json(&mut writer_half, &response).await?;
                }
            }
        }

        Ok(())
    }

    /// Answer a `logs` request with `logLine` frames and a final `logEnd`.
    ///
    /// Returns `false` when the client went away mid-stream, which also
    /// cancels a follow subscription. Bytes the client sends meanwhile are
    /// moved to `pending` so the end of the connection stays observable.
    async fn stream_logs<R, W>(
        &self,
        name: &str,
        follow: bool,
        reader: &mut R,
        pending: &mut Vec<u8>,
        writer: &mut W,
    ) -> Result<bool>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut subscription = match self.manager.stream_logs(name, follow) {
            Ok(subscription) => subscription,
            Err(e) => {
                ipc::write_json(writer, &Response::from(e)).await?;
                return Ok(true);
            }
        };

        // pipelined requests wait until the stream ends; past a frame's worth
        // of them the client is no longer read
        loop {
            let watch_client = pending.len() < ipc::MAX_FRAME_SIZE;
            tokio::select! {
                entry = subscription.next_line() => {
                    let Some(entry) = entry else { break };
                    let frame = Response::LogLine {
                        text: entry.content,
                        stream: entry.stream,
                    };
                    if ipc::write_json(writer, &frame).await.is_err() {
                        return Ok(false);
                    }
                }
                open = set_aside(reader, pending), if watch_client => {
                    if !open {
                        return Ok(false);
                    }
                }
            }
        }

        ipc::write_json(writer, &Response::LogEnd).await?;
        Ok(true)
    }

    /// Process incoming messages
    async fn process_message(&self, message: Message) -> Response {
        match message {
            Message::Status => Response::Status {
                running: self.is_running(),
                uptime_seconds: self.start_time.elapsed().as_secs(),
                pid: std::process::id(),
                process_count: self.manager.len(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            },
            Message::Start(request) => {
                let name = request.name.clone();
                match self.manager.start(request) {
                    Ok(info) => Response::Ok {
                        message: format!("Process '{}' started (status {})", name, info.status),
                    },
                    Err(e) => e.into(),
                }
            }
            Message::Stop { name, force } => match self.manager.stop(&name, force).await {
                Ok(()) => Response::Ok {
                    message: format!("Process '{}' stopped", name),
                },
                Err(e) => e.into(),
            },
            Message::List { verbose } => Response::Processes {
                processes: self.manager.list(verbose),
            },
            Message::Remove { name } => match self.manager.remove(&name).await {
                Ok(()) => Response::Ok {
                    message: format!("Process '{}' removed", name),
                },
                Err(e) => e.into(),
            },
            Message::Logs { name, .. } => Response::Error {
                message: format!("logs for '{}' must be streamed", name),
                code: Some("DAEMON005".to_string()),
            },
        }
    }
}

/// Move whatever the client sent into `pending`; `false` once it is gone
async fn set_aside<R>(reader: &mut R, pending: &mut Vec<u8>) -> bool
where
    R: AsyncBufRead + Unpin,
{
    match reader.fill_buf().await {
        Ok(buf) if !buf.is_empty() => {
            let read = buf.len();
            pending.extend_from_slice(buf);
            reader.consume(read);
            true
        }
        Ok(_) | Err(_) => false,
    }
}

/// Read the next request frame, starting with bytes set aside in `pending`
async fn next_frame<R>(
    reader: &mut R,
    pending: &mut Vec<u8>,
    frame: &mut Vec<u8>,
) -> Result<bool>
where
    R: AsyncBufRead + Unpin,
{
    if pending.is_empty() {
        return Ok(ipc::read_frame(reader, frame).await?);
    }

    let mut chained = pending.as_slice().chain(reader);
    let more = ipc::read_frame(&mut chained, frame).await;
    let unread = chained.into_inner().0.len();
    pending.drain(..pending.len() - unread);
    Ok(more?)
}
