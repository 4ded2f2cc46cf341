//! Per-process supervisor task
//!
//! [`ProcessSupervisor`] is the only owner of its OS process handle. It
//! publishes status transitions into the registry (holding the registry lock
//! only for each field update) and captured output into the record's
//! [`LogDistributor`].

use super::{
    decide, ControlMsg, ManagedProcess, OutputReader, ProcessAdapter, RestartAction,
    SupervisorConfig,
};
use crate::logging::{LogDistributor, MAX_LINE_BYTES};
use crate::registry::{ProcessRecord, ProcessRegistry};
use crate::{CoreError, Result};
use schema::{LogStream, ProcessExit, ProcessSpec, ProcessStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, timeout, timeout_at, Instant};
use tracing::{debug, error, info, warn};

/// How long trailing output is awaited after a process exits
const READER_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Supervisor task managing the lifecycle of a single Process Record
pub struct ProcessSupervisor {
    spec: ProcessSpec,
    process_adapter: Arc<dyn ProcessAdapter>,
    registry: Arc<ProcessRegistry>,
    logs: Arc<LogDistributor>,
    status_tx: watch::Sender<ProcessStatus>,
    restart_delay: Duration,
    shutdown_timeout: Duration,
    distribute_stderr: bool,
    /// Currently managed process (if any)
    current_process: Option<Box<dyn ManagedProcess>>,
    /// Output reader tasks of the current process
    readers: Vec<JoinHandle<()>>,
    /// Scheduled relaunch
    restart_at: Option<Instant>,
    /// SIGKILL deadline after a graceful stop
    kill_at: Option<Instant>,
    /// Set by an explicit stop; vetoes any relaunch
    stop_requested: bool,
    finished: bool,
    shutdown_ack: Option<oneshot::Sender<()>>,
}

impl ProcessSupervisor {
    /// Create a new supervisor; nothing runs until [`run`](Self::run)
    pub fn new(config: SupervisorConfig, status_tx: watch::Sender<ProcessStatus>) -> Self {
        let SupervisorConfig {
            spec,
            process_adapter,
            registry,
            logs,
            restart_delay,
            shutdown_timeout,
            distribute_stderr,
        } = config;

        Self {
            spec,
            process_adapter,
            registry,
            logs,
            status_tx,
            restart_delay,
            shutdown_timeout,
            distribute_stderr,
            current_process: None,
            readers: Vec::new(),
            restart_at: None,
            kill_at: None,
            stop_requested: false,
            finished: false,
            shutdown_ack: None,
        }
    }

    /// Launch the process and supervise it until the record is terminal
    pub async fn run(mut self, mut control_rx: mpsc::UnboundedReceiver<ControlMsg>) {
        info!("Starting supervisor for process '{}'", self.spec.name);
        self.launch(false).await;

        while !self.finished {
            let restart_at = self.restart_at;
            let kill_at = self.kill_at;

            tokio::select! {
                msg = control_rx.recv() => {
                    match msg {
                        Some(msg) => self.handle_control_message(msg).await,
                        None => {
                            debug!("Control channel closed, shutting down supervisor");
                            self.shutdown().await;
                        }
                    }
                }

                exit_result = wait_for_exit(&mut self.current_process),
                    if self.current_process.is_some() =>
                {
                    self.handle_process_exit(exit_result).await;
                }

                _ = sleep_until(restart_at.unwrap_or_else(Instant::now)),
                    if restart_at.is_some() =>
                {
                    self.restart_at = None;
                    self.launch(true).await;
                }

                _ = sleep_until(kill_at.unwrap_or_else(Instant::now)), if kill_at.is_some() => {
                    self.kill_at = None;
                    self.escalate().await;
                }
            }
        }

        drop(control_rx);
        if let Some(ack) = self.shutdown_ack.take() {
            let _ = ack.send(());
        }
        info!("Supervisor task for process '{}' terminated", self.spec.name);
    }

    async fn handle_control_message(&mut self, msg: ControlMsg) {
        match msg {
            ControlMsg::Stop { force, response } => {
                let result = self.stop(force).await;
                let _ = response.send(result);
            }
            ControlMsg::Shutdown { response } => {
                info!("Shutdown requested for process '{}'", self.spec.name);
                self.shutdown_ack = Some(response);
                self.shutdown().await;
            }
        }
    }

    /// Write a status transition into the registry and the status watch
    fn publish(&self, status: ProcessStatus, update: impl FnOnce(&mut ProcessRecord)) {
        let result = self.registry.update(&self.spec.name, |record| {
            record.status = status;
            update(record);
        });
        if let Err(e) = result {
            warn!("Cannot update record for '{}': {}", self.spec.name, e);
        }
        self.status_tx.send_replace(status);
    }

    /// STARTING, then RUNNING or EXITED(error)
    async fn launch(&mut self, relaunch: bool) {
        self.publish(ProcessStatus::Starting, |record| {
            record.pid = None;
            record.restart_pending = false;
            if relaunch {
                record.restart_count += 1;
            }
        });

        match self.process_adapter.spawn(&self.spec).await {
            Ok(mut process) => {
                let pid = process.pid();
                if let Some(stdout) = process.take_stdout() {
                    let reader = self.spawn_log_reader(stdout, LogStream::Stdout);
                    self.readers.push(reader);
                }
                if let Some(stderr) = process.take_stderr() {
                    let reader = self.spawn_log_reader(stderr, LogStream::Stderr);
                    self.readers.push(reader);
                }
                self.current_process = Some(process);

                self.publish(ProcessStatus::Running, |record| {
                    record.pid = Some(pid);
                    record.last_exit_error = None;
                    record.started_at = Some(schema::current_timestamp());
                });
                info!("Process '{}' running with pid {}", self.spec.name, pid);
            }
            Err(e) => {
                error!("Failed to launch process '{}': {}", self.spec.name, e);
                self.apply_restart_policy(Some(e.to_string()));
            }
        }
    }

    /// Read lines from one output stream until it closes.
    ///
    /// Lines are mirrored to local diagnostics; stdout (and stderr when
    /// enabled) is published to the distributor.
    fn spawn_log_reader(&self, reader: OutputReader, stream: LogStream) -> JoinHandle<()> {
        let name = self.spec.name.clone();
        let logs = match stream {
            LogStream::Stderr if !self.distribute_stderr => None,
            _ => Some(self.logs.clone()),
        };

        tokio::spawn(async move {
            let tag = match stream {
                LogStream::Stdout => "stdout",
                LogStream::Stderr => "stderr",
            };
            let mut reader = BufReader::new(reader);
            let mut buf = Vec::with_capacity(256);

            loop {
                match read_line_capped(&mut reader, &mut buf, MAX_LINE_BYTES).await {
                    Ok(false) => break,
                    Ok(true) => {
                        let line = take_line(&mut buf, MAX_LINE_BYTES);
                        debug!("[{}] {}: {}", tag, name, line);
                        if let Some(logs) = &logs {
                            logs.publish(stream, line);
                        }
                    }
                    Err(e) => {
                        warn!("Error reading {} of '{}': {}", tag, name, e);
                        break;
                    }
                }
            }
        })
    }

    /// Give reader tasks a bounded window to forward trailing lines
    async fn drain_readers(&mut self) {
        let deadline = Instant::now() + READER_DRAIN_TIMEOUT;
        for mut reader in self.readers.drain(..) {
            if timeout_at(deadline, &mut reader).await.is_err() {
                debug!("Output reader of '{}' still open, aborting", self.spec.name);
                reader.abort();
            }
        }
    }

    async fn handle_process_exit(&mut self, exit_result: Result<ProcessExit>) {
        self.current_process = None;
        self.kill_at = None;
        self.drain_readers().await;

        let exit_error = match exit_result {
            Ok(exit) => {
                info!(
                    "Process '{}' (pid {}) exited: code={:?} signal={:?}",
                    self.spec.name, exit.pid, exit.exit_code, exit.signal
                );
                exit.error_message()
            }
            Err(e) => {
                error!("Error waiting for process '{}': {}", self.spec.name, e);
                Some(e.to_string())
            }
        };

        if self.stop_requested {
            self.publish(ProcessStatus::Stopped, |record| {
                record.last_exit_error = exit_error;
                record.restart_pending = false;
            });
            self.finish();
        } else {
            self.apply_restart_policy(exit_error);
        }
    }

    /// EXITED, then either schedule a relaunch or finish
    fn apply_restart_policy(&mut self, exit_error: Option<String>) {
        let action = decide(self.spec.restart_policy, exit_error.as_deref());
        let relaunch = action == RestartAction::Relaunch;

        self.publish(ProcessStatus::Exited, |record| {
            record.last_exit_error = exit_error;
            record.restart_pending = relaunch;
        });

        if relaunch {
            info!(
                "Relaunching process '{}' in {:?}",
                self.spec.name, self.restart_delay
            );
            self.restart_at = Some(Instant::now() + self.restart_delay);
        } else {
            info!("Process '{}' will not be relaunched", self.spec.name);
            self.finish();
        }
    }

    async fn stop(&mut self, force: bool) -> Result<()> {
        if self.stop_requested {
            return Err(CoreError::NotRunning(self.spec.name.clone()));
        }

        if let Some(process) = self.current_process.as_mut() {
            if force {
                process.kill().await?;
            } else {
                process.terminate().await?;
                self.kill_at = Some(Instant::now() + self.shutdown_timeout);
            }
            self.stop_requested = true;
            self.publish(ProcessStatus::Stopped, |record| record.restart_pending = false);
            info!("Stop requested for process '{}' (force={})", self.spec.name, force);
            return Ok(());
        }

        if self.restart_at.take().is_some() {
            self.stop_requested = true;
            self.publish(ProcessStatus::Stopped, |record| record.restart_pending = false);
            info!("Pending relaunch of '{}' cancelled", self.spec.name);
            self.finish();
            return Ok(());
        }

        Err(CoreError::NotRunning(self.spec.name.clone()))
    }

    /// SIGKILL a process that ignored SIGTERM
    async fn escalate(&mut self) {
        if let Some(process) = self.current_process.as_mut() {
            warn!(
                "Process '{}' did not exit within {:?}, sending SIGKILL",
                self.spec.name, self.shutdown_timeout
            );
            if let Err(e) = process.kill().await {
                error!("Failed to kill process '{}': {}", self.spec.name, e);
            }
        }
    }

    /// Terminate any running instance and end supervision
    async fn shutdown(&mut self) {
        self.stop_requested = true;
        self.restart_at = None;
        self.kill_at = None;

        let mut exit_error = None;
        if let Some(mut process) = self.current_process.take() {
            if let Err(e) = process.terminate().await {
                warn!("Failed to terminate process '{}': {}", self.spec.name, e);
            }
            let exit = match timeout(self.shutdown_timeout, process.wait()).await {
                Ok(exit) => exit,
                Err(_) => {
                    warn!(
                        "Process '{}' did not exit gracefully within timeout, killing it",
                        self.spec.name
                    );
                    if let Err(e) = process.kill().await {
                        error!("Failed to kill process '{}': {}", self.spec.name, e);
                    }
                    process.wait().await
                }
            };
            exit_error = match exit {
                Ok(exit) => exit.error_message(),
                Err(e) => Some(e.to_string()),
            };
            self.drain_readers().await;
        }

        self.publish(ProcessStatus::Stopped, |record| {
            record.restart_pending = false;
            if exit_error.is_some() {
                record.last_exit_error = exit_error;
            }
        });
        self.finish();
    }

    fn finish(&mut self) {
        self.logs.close();
        self.finished = true;
    }
}

/// Wait on the current process, pending forever when there is none
async fn wait_for_exit(process: &mut Option<Box<dyn ManagedProcess>>) -> Result<ProcessExit> {
    match process {
        Some(process) => process.wait().await,
        None => std::future::pending().await,
    }
}

/// Read up to one line into `buf`, stopping after `cap` bytes.
///
/// Returns `Ok(false)` once the stream is exhausted and `buf` is empty. A
/// line ending arriving right at the cap stays with the capped piece.
async fn read_line_capped<R>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    cap: usize,
) -> std::io::Result<bool>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let chunk = reader.fill_buf().await?;
        if chunk.is_empty() {
            return Ok(!buf.is_empty());
        }
        if buf.len() >= cap {
            let ending = match chunk {
                [b'\n', ..] => 1,
                [b'\r', b'\n', ..] => 2,
                _ => 0,
            };
            if ending > 0 {
                buf.push(b'\n');
                reader.consume(ending);
            }
            return Ok(true);
        }

        let window = &chunk[..chunk.len().min(cap - buf.len())];
        if let Some(idx) = window.iter().position(|b| *b == b'\n') {
            buf.extend_from_slice(&window[..=idx]);
            reader.consume(idx + 1);
            return Ok(true);
        }
        let read = window.len();
        buf.extend_from_slice(window);
        reader.consume(read);
    }
}

/// Turn the bytes read by [`read_line_capped`] into one log line.
///
/// A capped piece is cut before any trailing partial UTF-8 sequence; those
/// bytes stay in `buf` and start the next piece.
fn take_line(buf: &mut Vec<u8>, cap: usize) -> String {
    if matches!(buf.last(), Some(b'\n')) {
        buf.pop();
        if matches!(buf.last(), Some(b'\r')) {
            buf.pop();
        }
    } else if buf.len() >= cap {
        let end = utf8_boundary(buf);
        let line = String::from_utf8_lossy(&buf[..end]).into_owned();
        buf.drain(..end);
        return line;
    }
    let line = String::from_utf8_lossy(buf).into_owned();
    buf.clear();
    line
}

/// Length of `bytes` without a trailing incomplete UTF-8 sequence
fn utf8_boundary(bytes: &[u8]) -> usize {
    for back in 1..=bytes.len().min(3) {
        let idx = bytes.len() - back;
        let width = match bytes[idx] {
            0x80..=0xBF => continue,
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => 1,
        };
        return if width > back && idx > 0 { idx } else { bytes.len() };
    }
    bytes.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn split_lines(input: &[u8], cap: usize) -> Vec<String> {
        let mut reader = input;
        let mut buf = Vec::new();
        let mut lines = Vec::new();
        while read_line_capped(&mut reader, &mut buf, cap).await.unwrap() {
            lines.push(take_line(&mut buf, cap));
        }
        lines
    }

    #[tokio::test]
    async fn test_long_line_is_split_at_cap() {
        let mut input = "x".repeat(20_000).into_bytes();
        input.extend_from_slice(b"\nafter\n");

        let lines = split_lines(&input, MAX_LINE_BYTES).await;
        assert_eq!(lines.len(), 4);
        assert!(lines.iter().all(|l| l.len() <= MAX_LINE_BYTES));
        assert_eq!(lines[..3].concat(), "x".repeat(20_000));
        assert_eq!(lines[3], "after");
    }

    #[tokio::test]
    async fn test_newline_at_cap_adds_no_empty_line() {
        assert_eq!(split_lines(b"abcd\r\nef", 4).await, vec!["abcd", "ef"]);
        assert_eq!(split_lines(b"abcd\nef\n", 4).await, vec!["abcd", "ef"]);
    }

    #[tokio::test]
    async fn test_split_keeps_multibyte_chars_whole() {
        assert_eq!(split_lines("aéé\n".as_bytes(), 4).await, vec!["aé", "é"]);
    }

    #[tokio::test]
    async fn test_trailing_text_without_newline() {
        assert_eq!(split_lines(b"one\ntwo", 64).await, vec!["one", "two"]);
        assert!(split_lines(b"", 64).await.is_empty());
    }
}
