//! Process specification and status types for the drover supervisor
//!
//! This module contains the data structures shared between the supervision
//! engine, the daemon, and the CLI for describing managed processes.
//!
//! ## Process Lifecycle
//!
//! Managed processes move through the following statuses:
//! - `Starting`: the record exists and a launch is in progress
//! - `Running`: an OS process is alive for the record
//! - `Exited`: the last instance terminated (a relaunch may still be pending)
//! - `Stopped`: an explicit stop was requested; no further relaunches
//!
//! ## Restart Policies
//!
//! - `Never`: never relaunch the process
//! - `Always`: relaunch after every exit
//! - `OnFailure`: relaunch only when the process ended with an error

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

/// Launch specification for one managed process
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProcessSpec {
    /// Unique name, used as the registry key
    pub name: String,

    /// Command to execute
    pub command: String,

    /// Command line arguments
    #[serde(default)]
    pub args: Vec<String>,

    /// Restart policy applied when the process exits
    #[serde(default)]
    pub restart_policy: RestartPolicy,
}

/// Current status of a managed process
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    /// Launch in progress
    Starting,
    /// OS process is alive
    Running,
    /// Last instance terminated
    Exited,
    /// Explicitly stopped
    Stopped,
}

impl ProcessStatus {
    /// Check if an OS process is (or is about to be) associated with the record
    pub fn is_live(&self) -> bool {
        matches!(self, ProcessStatus::Starting | ProcessStatus::Running)
    }

    /// Lowercase name used on the wire and in CLI output
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessStatus::Starting => "starting",
            ProcessStatus::Running => "running",
            ProcessStatus::Exited => "exited",
            ProcessStatus::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Restart policy determining when a process should be relaunched
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    /// Never automatically relaunch the process
    #[default]
    Never,
    /// Relaunch the process whenever it exits
    Always,
    /// Relaunch only if the process exits with an error
    OnFailure,
}

impl RestartPolicy {
    /// Name accepted by `--auto-restart` and the wire protocol
    pub fn as_str(&self) -> &'static str {
        match self {
            RestartPolicy::Never => "never",
            RestartPolicy::Always => "always",
            RestartPolicy::OnFailure => "on-failure",
        }
    }
}

impl fmt::Display for RestartPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a managed process as reported to clients
///
/// The optional fields are only populated for verbose listings.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProcessInfo {
    /// Process name
    pub name: String,
    /// OS process id, `0` while no instance has been spawned
    pub pid: u32,
    /// Current status
    pub status: ProcessStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart_policy: Option<RestartPolicy>,
    /// Number of relaunches performed so far
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restarts: Option<u32>,
    /// Last termination error, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_exit_error: Option<String>,
    /// RFC3339 start time of the current instance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
}

/// Information about a process exit
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProcessExit {
    /// Process ID that exited
    pub pid: u32,

    /// Exit code (None if killed by signal)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,

    /// Signal that killed the process (Unix only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal: Option<i32>,

    /// Timestamp when the exit was detected
    pub timestamp: String,
}

impl ProcessExit {
    /// Check if this represents a successful exit (code 0)
    pub fn is_success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Check if this represents a failure (non-zero exit code or signal)
    pub fn is_failure(&self) -> bool {
        !self.is_success()
    }

    /// Termination error text, `None` on a clean exit
    pub fn error_message(&self) -> Option<String> {
        if self.is_success() {
            return None;
        }
        match (self.exit_code, self.signal) {
            (Some(code), _) => Some(format!("exit status {}", code)),
            (None, Some(signal)) => Some(format!("signal: {}", signal)),
            (None, None) => Some("terminated abnormally".to_string()),
        }
    }
}

/// Output stream a captured line came from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum LogStream {
    /// Standard output
    Stdout,
    /// Standard error
    Stderr,
}

/// Current time as an RFC3339 string with second precision
pub fn current_timestamp() -> String {
    humantime::format_rfc3339_seconds(SystemTime::now()).to_string()
}
