//! IPC (Inter-Process Communication) module
//!
//! This crate handles communication between the daemon and its clients over
//! TCP, one newline-terminated JSON frame per message.

pub mod error;
pub mod frame;

pub use error::{IpcError, Result};
pub use frame::{read_frame, read_json, write_json, MAX_FRAME_SIZE};

use schema::{LogStream, Message, Response};
use std::future::Future;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::net::TcpStream;
use tracing::debug;

/// IPC client for communicating with the daemon
#[derive(Debug)]
pub struct IpcClient {
    host: String,
    port: u16,
    timeout: Duration,
}

impl IpcClient {
    /// Create a new IPC client
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            timeout: Duration::from_secs(30),
        }
    }

    /// Bound connect and request/response round-trips by `timeout`.
    ///
    /// Following a log stream is not bounded.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn bounded<F, T>(&self, what: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| IpcError::Timeout(format!("{} timed out after {:?}", what, self.timeout)))?
    }

    /// Connect and send `message`, returning the buffered connection.
    ///
    /// The write side stays open until the connection is dropped; the daemon
    /// treats EOF as a disconnect.
    async fn request(&self, message: &Message) -> Result<BufReader<TcpStream>> {
        let addr = format!("{}:{}", self.host, self.port);

        debug!("Connecting to daemon at {}", addr);
        let stream = self
            .bounded("connect", async {
                TcpStream::connect(&addr)
                    .await
                    .map_err(|e| IpcError::ConnectionFailed(format!("{addr}: {e}")))
            })
            .await?;

        let mut stream = BufReader::new(stream);
        write_json(stream.get_mut(), message).await?;
        Ok(stream)
    }

    /// Connect to the daemon and send a message
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails, the message cannot be serialized,
    /// or the response cannot be read or deserialized.
    pub async fn send_message(&self, message: &Message) -> Result<Response> {
        let mut reader = self.request(message).await?;
        self.bounded("response", async {
            read_json(&mut reader)
                .await?
                .ok_or(IpcError::EmptyResponse)
        })
        .await
    }

    /// Request the captured output of `name` and hand every line to `on_line`.
    ///
    /// Returns once the daemon sends `logEnd`. An `error` frame becomes
    /// [`IpcError::Remote`].
    pub async fn stream_logs<F>(&self, name: &str, follow: bool, mut on_line: F) -> Result<()>
    where
        F: FnMut(&str, LogStream),
    {
        let message = Message::Logs {
            name: name.to_string(),
            follow,
        };
        let mut reader = self.request(&message).await?;

        loop {
            let frame: Option<Response> = read_json(&mut reader).await?;
            match frame {
                Some(Response::LogLine { text, stream }) => on_line(&text, stream),
                Some(Response::LogEnd) => return Ok(()),
                Some(Response::Error { message, code }) => {
                    return Err(IpcError::Remote { message, code })
                }
                Some(other) => {
                    return Err(IpcError::ProtocolError(format!(
                        "unexpected frame in log stream: {other:?}"
                    )))
                }
                None => {
                    return Err(IpcError::ProtocolError(
                        "log stream closed before logEnd".to_string(),
                    ))
                }
            }
        }
    }
}
