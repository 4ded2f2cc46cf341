//! Unix process spawning with per-process sessions
//!
//! Every managed process is started as the leader of a new session (and so
//! of a new process group) via `setsid()`. Signals are then delivered to the
//! whole group, which also reaches any children the process forked.

// setsid() has to be called from pre_exec
#![allow(unsafe_code)]

use crate::{CoreError, Result};
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::os::unix::process::CommandExt;
use std::process::Stdio;
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tracing::{debug, error};

/// A spawned child that leads its own process group
#[derive(Debug)]
pub struct ChildProcess {
    pid: Pid,
    child: Child,
}

impl ChildProcess {
    /// Get the process ID
    pub fn pid(&self) -> u32 {
        self.pid.as_raw() as u32
    }

    /// Get the process group ID (same as PID for session leaders)
    pub fn pgid(&self) -> u32 {
        self.pid.as_raw() as u32
    }

    /// Wait for the process to exit and return its exit status
    pub async fn wait(&mut self) -> Result<std::process::ExitStatus> {
        self.child.wait().await.map_err(|e| {
            CoreError::ProcessWait(format!("Failed to wait for process {}: {}", self.pid, e))
        })
    }

    /// Poll for exit without blocking
    pub fn try_wait(&mut self) -> Result<Option<std::process::ExitStatus>> {
        self.child.try_wait().map_err(|e| {
            CoreError::ProcessWait(format!(
                "Failed to try_wait for process {}: {}",
                self.pid, e
            ))
        })
    }

    /// Take the piped stdout handle, if not taken yet
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    /// Take the piped stderr handle, if not taken yet
    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.child.stderr.take()
    }
}

/// Spawn `cmd` with `args` in a new session.
///
/// stdout and stderr are piped for capture, stdin is closed. Spawn errors
/// (missing binary, permissions) become [`CoreError::SpawnFailed`].
///
/// ```rust,no_run
/// use drover_core::process::unix::spawn;
///
/// # async fn demo() -> drover_core::Result<()> {
/// let child = spawn("echo", &["hello".to_string()])?;
/// println!("Spawned process with PID: {}", child.pid());
/// # Ok(())
/// # }
/// ```
pub fn spawn(cmd: &str, args: &[String]) -> Result<ChildProcess> {
    debug!("Spawning process: {} {:?}", cmd, args);

    let mut command = Command::new(cmd);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    // Safety: setsid() is async-signal-safe and only touches the child
    unsafe {
        command.pre_exec(|| {
            if libc::setsid() == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }

    let child = command.spawn().map_err(|e| {
        error!("Failed to spawn process '{}': {}", cmd, e);
        CoreError::SpawnFailed(format!("{}: {}", cmd, e))
    })?;

    let raw_pid = child
        .id()
        .ok_or_else(|| CoreError::SpawnFailed(format!("{}: child has no pid", cmd)))?;
    let pid = Pid::from_raw(raw_pid as i32);
    debug!("Spawned process {} in new process group", pid);

    Ok(ChildProcess { pid, child })
}

fn signal_group(child: &ChildProcess, signal: Signal) -> Result<()> {
    debug!("Sending {} to process group {}", signal, child.pid);

    match killpg(child.pid, signal) {
        Ok(()) => Ok(()),
        // Group already gone
        Err(nix::errno::Errno::ESRCH) | Err(nix::errno::Errno::EPERM) => {
            debug!("Process group {} already exited", child.pid);
            Ok(())
        }
        Err(e) => {
            error!("Failed to send {} to process group {}: {}", signal, child.pid, e);
            Err(CoreError::ProcessSignal(format!(
                "Failed to send {} to process group {}: {}",
                signal, child.pid, e
            )))
        }
    }
}

/// Send SIGTERM to the child's process group
pub fn signal_term_group(child: &ChildProcess) -> Result<()> {
    signal_group(child, Signal::SIGTERM)
}

/// Send SIGKILL to the child's process group
pub fn signal_kill_group(child: &ChildProcess) -> Result<()> {
    signal_group(child, Signal::SIGKILL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;

    #[tokio::test]
    async fn test_spawn_leads_own_group() {
        let mut child = spawn("true", &[]).expect("Failed to spawn true");
        assert!(child.pid() > 0);
        assert_eq!(child.pid(), child.pgid());
        let status = child.wait().await.expect("Failed to wait for process");
        assert!(status.success());
    }

    #[tokio::test]
    async fn test_spawn_nonexistent_command() {
        match spawn("nonexistent_command_12345", &[]) {
            Err(CoreError::SpawnFailed(msg)) => assert!(msg.contains("nonexistent_command_12345")),
            other => panic!("Expected SpawnFailed, got: {:?}", other.map(|c| c.pid())),
        }
    }

    #[tokio::test]
    async fn test_signal_term_group() {
        let mut child = spawn("sleep", &["30".to_string()]).unwrap();
        signal_term_group(&child).unwrap();
        let status = child.wait().await.unwrap();
        assert_eq!(status.signal(), Some(libc::SIGTERM));
    }

    #[tokio::test]
    async fn test_signal_after_exit_is_ok() {
        let mut child = spawn("true", &[]).unwrap();
        child.wait().await.unwrap();
        assert!(signal_term_group(&child).is_ok());
        assert!(signal_kill_group(&child).is_ok());
    }
}
