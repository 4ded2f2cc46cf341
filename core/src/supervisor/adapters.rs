//! Process adapters for abstracting process management
//!
//! The Lifecycle Supervisor only talks to [`ProcessAdapter`] and
//! [`ManagedProcess`], so it can be driven by real Unix processes in
//! production and by [`MockProcessAdapter`] in tests.

use crate::{CoreError, Result};
use async_trait::async_trait;
use schema::{ProcessExit, ProcessSpec};
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncRead;
use tracing::debug;

/// Boxed output stream of a managed process
pub type OutputReader = Pin<Box<dyn AsyncRead + Send + Unpin>>;

/// Trait for spawning processes in a platform-agnostic way
#[async_trait]
pub trait ProcessAdapter: Send + Sync {
    /// Spawn a new managed process according to the specification
    async fn spawn(&self, spec: &ProcessSpec) -> Result<Box<dyn ManagedProcess>>;
}

/// A running process that can be waited on and signalled
#[async_trait]
pub trait ManagedProcess: Send {
    /// Get the process ID
    fn pid(&self) -> u32;

    /// Wait for the process to exit. Must be cancellation safe.
    async fn wait(&mut self) -> Result<ProcessExit>;

    /// Terminate the process gracefully (SIGTERM)
    async fn terminate(&mut self) -> Result<()>;

    /// Kill the process forcefully (SIGKILL)
    async fn kill(&mut self) -> Result<()>;

    /// Take the child's stdout, `None` if not piped or already taken
    fn take_stdout(&mut self) -> Option<OutputReader>;

    /// Take the child's stderr, `None` if not piped or already taken
    fn take_stderr(&mut self) -> Option<OutputReader>;
}

/// Adapter spawning real processes in their own process group
#[cfg(unix)]
#[derive(Copy, Clone, Debug, Default)]
pub struct UnixProcessAdapter;

#[cfg(unix)]
impl UnixProcessAdapter {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(unix)]
#[async_trait]
impl ProcessAdapter for UnixProcessAdapter {
    async fn spawn(&self, spec: &ProcessSpec) -> Result<Box<dyn ManagedProcess>> {
        let child = crate::process::unix::spawn(&spec.command, &spec.args)?;
        Ok(Box::new(UnixManagedProcess { child }))
    }
}

#[cfg(unix)]
struct UnixManagedProcess {
    child: crate::process::unix::ChildProcess,
}

#[cfg(unix)]
#[async_trait]
impl ManagedProcess for UnixManagedProcess {
    fn pid(&self) -> u32 {
        self.child.pid()
    }

    async fn wait(&mut self) -> Result<ProcessExit> {
        use std::os::unix::process::ExitStatusExt;

        let status = self.child.wait().await?;
        Ok(ProcessExit {
            pid: self.pid(),
            exit_code: status.code(),
            signal: status.signal(),
            timestamp: schema::current_timestamp(),
        })
    }

    async fn terminate(&mut self) -> Result<()> {
        crate::process::unix::signal_term_group(&self.child)
    }

    async fn kill(&mut self) -> Result<()> {
        crate::process::unix::signal_kill_group(&self.child)
    }

    fn take_stdout(&mut self) -> Option<OutputReader> {
        self.child
            .take_stdout()
            .map(|s| Box::pin(s) as OutputReader)
    }

    fn take_stderr(&mut self) -> Option<OutputReader> {
        self.child
            .take_stderr()
            .map(|s| Box::pin(s) as OutputReader)
    }
}

/// Mock process adapter for testing
///
/// Each spawn consumes the next queued [`MockInstruction`]; once the queue is
/// empty the default instruction is used. PIDs increase monotonically.
#[derive(Debug, Clone)]
pub struct MockProcessAdapter {
    instructions: Arc<tokio::sync::Mutex<VecDeque<MockInstruction>>>,
    fallback: Arc<tokio::sync::Mutex<MockInstruction>>,
    next_pid: Arc<AtomicU32>,
    spawn_count: Arc<AtomicU32>,
}

/// Scripted behavior of one mock process
#[derive(Debug, Clone)]
pub struct MockInstruction {
    /// How long to wait before the process "exits"
    pub exit_delay: Duration,
    /// Exit code to return (None means killed by signal)
    pub exit_code: Option<i32>,
    /// Signal that killed the process
    pub signal: Option<i32>,
    /// Whether SIGTERM ends the process (SIGKILL always does)
    pub responds_to_signals: bool,
    /// Lines written to stdout right after spawn
    pub stdout: Vec<String>,
    /// Lines written to stderr right after spawn
    pub stderr: Vec<String>,
    /// Make the spawn itself fail with this message
    pub spawn_error: Option<String>,
}

impl Default for MockInstruction {
    fn default() -> Self {
        Self {
            exit_delay: Duration::from_millis(100),
            exit_code: Some(0),
            signal: None,
            responds_to_signals: true,
            stdout: Vec::new(),
            stderr: Vec::new(),
            spawn_error: None,
        }
    }
}

impl MockInstruction {
    /// A process that exits with `code` after `delay`
    pub fn exits_with(code: i32, delay: Duration) -> Self {
        Self {
            exit_delay: delay,
            exit_code: Some(code),
            ..Self::default()
        }
    }

    /// A process that runs until signalled
    pub fn long_running() -> Self {
        Self {
            exit_delay: Duration::from_secs(3600),
            ..Self::default()
        }
    }

    /// A spawn that fails
    pub fn spawn_failure(message: &str) -> Self {
        Self {
            spawn_error: Some(message.to_string()),
            ..Self::default()
        }
    }

    /// Attach stdout lines
    pub fn with_stdout(mut self, lines: &[&str]) -> Self {
        self.stdout = lines.iter().map(|l| l.to_string()).collect();
        self
    }

    /// Attach stderr lines
    pub fn with_stderr(mut self, lines: &[&str]) -> Self {
        self.stderr = lines.iter().map(|l| l.to_string()).collect();
        self
    }
}

impl MockProcessAdapter {
    /// Create a new mock adapter with no queued instructions
    pub fn new() -> Self {
        Self::with_default(MockInstruction::default())
    }

    /// Create a mock whose processes follow `instruction` unless told otherwise
    pub fn with_default(instruction: MockInstruction) -> Self {
        Self {
            instructions: Arc::new(tokio::sync::Mutex::new(VecDeque::new())),
            fallback: Arc::new(tokio::sync::Mutex::new(instruction)),
            next_pid: Arc::new(AtomicU32::new(1000)),
            spawn_count: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Queue instructions for the next spawned process
    pub async fn add_instruction(&self, instruction: MockInstruction) {
        self.instructions.lock().await.push_back(instruction);
    }

    /// Replace the instruction used once the queue is empty
    pub async fn set_default(&self, instruction: MockInstruction) {
        *self.fallback.lock().await = instruction;
    }

    /// Number of spawn attempts so far, failed ones included
    pub fn spawn_count(&self) -> u32 {
        self.spawn_count.load(Ordering::SeqCst)
    }
}

impl Default for MockProcessAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessAdapter for MockProcessAdapter {
    async fn spawn(&self, spec: &ProcessSpec) -> Result<Box<dyn ManagedProcess>> {
        debug!("Spawning mock process for: {} {:?}", spec.command, spec.args);
        self.spawn_count.fetch_add(1, Ordering::SeqCst);

        let queued = self.instructions.lock().await.pop_front();
        let instruction = match queued {
            Some(instruction) => instruction,
            None => self.fallback.lock().await.clone(),
        };

        if let Some(message) = &instruction.spawn_error {
            return Err(CoreError::SpawnFailed(format!("{}: {}", spec.command, message)));
        }

        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockManagedProcess::new(pid, instruction)))
    }
}

struct MockManagedProcess {
    pid: u32,
    instruction: MockInstruction,
    started_at: tokio::time::Instant,
    terminated: bool,
    killed: bool,
    stdout: Option<OutputReader>,
    stderr: Option<OutputReader>,
}

fn synthetic_output(lines: &[String]) -> OutputReader {
    let mut bytes = Vec::new();
    for line in lines {
        bytes.extend_from_slice(line.as_bytes());
        bytes.push(b'\n');
    }
    Box::pin(std::io::Cursor::new(bytes))
}

impl MockManagedProcess {
    fn new(pid: u32, instruction: MockInstruction) -> Self {
        let stdout = Some(synthetic_output(&instruction.stdout));
        let stderr = Some(synthetic_output(&instruction.stderr));
        Self {
            pid,
            instruction,
            started_at: tokio::time::Instant::now(),
            terminated: false,
            killed: false,
            stdout,
            stderr,
        }
    }

    fn should_exit(&self) -> bool {
        self.killed
            || (self.terminated && self.instruction.responds_to_signals)
            || self.started_at.elapsed() >= self.instruction.exit_delay
    }

    fn create_exit(&self) -> ProcessExit {
        let (exit_code, signal) = if self.killed {
            (None, Some(9))
        } else if self.terminated && self.instruction.responds_to_signals {
            (None, Some(15))
        } else {
            (self.instruction.exit_code, self.instruction.signal)
        };

        ProcessExit {
            pid: self.pid,
            exit_code,
            signal,
            timestamp: schema::current_timestamp(),
        }
    }
}

#[async_trait]
impl ManagedProcess for MockManagedProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    async fn wait(&mut self) -> Result<ProcessExit> {
        while !self.should_exit() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        Ok(self.create_exit())
    }

    async fn terminate(&mut self) -> Result<()> {
        debug!("Terminating mock process {}", self.pid);
        self.terminated = true;
        Ok(())
    }

    async fn kill(&mut self) -> Result<()> {
        debug!("Killing mock process {}", self.pid);
        self.killed = true;
        Ok(())
    }

    fn take_stdout(&mut self) -> Option<OutputReader> {
        self.stdout.take()
    }

    fn take_stderr(&mut self) -> Option<OutputReader> {
        self.stderr.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schema::RestartPolicy;
    use tokio::io::{AsyncBufReadExt, BufReader};

    fn create_test_spec() -> ProcessSpec {
        ProcessSpec {
            name: "test".to_string(),
            command: "echo".to_string(),
            args: vec!["hello".to_string()],
            restart_policy: RestartPolicy::Never,
        }
    }

    #[tokio::test]
    async fn test_mock_process_wait() {
        let adapter = MockProcessAdapter::new();
        let mut process = adapter.spawn(&create_test_spec()).await.unwrap();
        let exit = process.wait().await.unwrap();

        assert_eq!(exit.exit_code, Some(0));
        assert_eq!(exit.signal, None);
        assert_eq!(exit.pid, process.pid());
    }

    #[tokio::test]
    async fn test_mock_pids_increase() {
        let adapter = MockProcessAdapter::new();
        let spec = create_test_spec();
        let first = adapter.spawn(&spec).await.unwrap().pid();
        let second = adapter.spawn(&spec).await.unwrap().pid();
        assert!(second > first);
        assert_eq!(adapter.spawn_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_process_terminate() {
        let adapter = MockProcessAdapter::new();
        adapter.add_instruction(MockInstruction::long_running()).await;

        let mut process = adapter.spawn(&create_test_spec()).await.unwrap();
        process.terminate().await.unwrap();

        let exit = process.wait().await.unwrap();
        assert_eq!(exit.exit_code, None);
        assert_eq!(exit.signal, Some(15));
        assert_eq!(exit.error_message().as_deref(), Some("signal: 15"));
    }

    #[tokio::test]
    async fn test_mock_ignores_term_but_not_kill() {
        let adapter = MockProcessAdapter::new();
        adapter
            .add_instruction(MockInstruction {
                responds_to_signals: false,
                ..MockInstruction::long_running()
            })
            .await;

        let mut process = adapter.spawn(&create_test_spec()).await.unwrap();
        process.terminate().await.unwrap();
        let waited = tokio::time::timeout(Duration::from_millis(100), process.wait()).await;
        assert!(waited.is_err());

        process.kill().await.unwrap();
        let exit = process.wait().await.unwrap();
        assert_eq!(exit.signal, Some(9));
    }

    #[tokio::test]
    async fn test_mock_spawn_failure() {
        let adapter = MockProcessAdapter::new();
        adapter
            .add_instruction(MockInstruction::spawn_failure("no such file"))
            .await;

        let result = adapter.spawn(&create_test_spec()).await;
        assert!(matches!(result, Err(CoreError::SpawnFailed(_))));
        assert!(adapter.spawn(&create_test_spec()).await.is_ok());
    }

    #[tokio::test]
    async fn test_mock_stdout_lines() {
        let adapter = MockProcessAdapter::new();
        adapter
            .add_instruction(MockInstruction::default().with_stdout(&["a", "b"]))
            .await;

        let mut process = adapter.spawn(&create_test_spec()).await.unwrap();
        let stdout = process.take_stdout().unwrap();
        assert!(process.take_stdout().is_none());

        let mut lines = BufReader::new(stdout).lines();
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("a"));
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("b"));
        assert_eq!(lines.next_line().await.unwrap(), None);
    }
}
