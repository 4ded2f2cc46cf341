//! Schema definitions for drover
//!
//! This crate contains shared data structures used by the supervisor daemon,
//! its clients and the supervision engine. All types here implement JSON
//! Schema generation for external consumption.

pub mod process;


pub use process::*;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Request to launch a new managed process
///
/// `restart_policy` is kept as raw text so the supervisor can normalize
/// unknown values instead of rejecting the request.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    /// Unique process name
    pub name: String,
    /// Command to execute
    pub command: String,
    /// Command line arguments
    #[serde(default)]
    pub args: Vec<String>,
    /// One of `never`, `always`, `on-failure`
    #[serde(default = "default_restart_policy")]
    pub restart_policy: String,
}

fn default_restart_policy() -> String {
    RestartPolicy::Never.as_str().to_string()
}

/// Requests sent by clients to the daemon, one JSON object per line
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Message {
    /// Launch and supervise a new process
    Start(StartRequest),
    /// Stop a supervised process
    Stop {
        name: String,
        #[serde(default)]
        force: bool,
    },
    /// List supervised processes
    List {
        #[serde(default)]
        verbose: bool,
    },
    /// Stream captured output of a process
    Logs {
        name: String,
        #[serde(default)]
        follow: bool,
    },
    /// Remove a process record that is no longer running
    Remove { name: String },
    /// Request daemon status
    Status,
}

/// Responses from the daemon
///
/// A `logs` request is answered with any number of `logLine` frames
/// followed by exactly one `logEnd` (or a single `error`).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Response {
    /// Successful operation with message
    Ok { message: String },
    /// Error response with details
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
    /// Process listing
    Processes { processes: Vec<ProcessInfo> },
    /// One captured output line
    LogLine { text: String, stream: LogStream },
    /// End of a log stream
    LogEnd,
    /// Status information
    #[serde(rename_all = "camelCase")]
    Status {
        running: bool,
        uptime_seconds: u64,
        pid: u32,
        process_count: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        version: Option<String>,
    },
}

impl Response {
    /// Whether this response reports a failure
    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error { .. })
    }
}

/// Configuration structure for the daemon
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct DaemonConfig {
    /// Host to bind the daemon to
    pub host: String,
    /// Port to bind the daemon to (`0` picks an ephemeral port)
    pub port: u16,
    /// Log level for the daemon
    pub log_level: String,
    /// Maximum number of concurrent connections
    pub max_connections: usize,
    /// Lines retained per process log buffer
    pub log_capacity: usize,
    /// Delay before relaunching an exited process
    pub restart_delay_ms: u64,
    /// Poll interval of following log streams when idle
    pub log_poll_interval_ms: u64,
    /// Grace period between SIGTERM and SIGKILL
    pub shutdown_timeout_secs: u64,
    /// Whether stderr lines are included in remote log streams
    pub distribute_stderr: bool,
    /// Processes launched when the daemon boots
    pub processes: Vec<StartRequest>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 50051,
            log_level: "info".to_string(),
            max_connections: 100,
            log_capacity: 100,
            restart_delay_ms: 1000,
            log_poll_interval_ms: 100,
            shutdown_timeout_secs: 5,
            distribute_stderr: true,
            processes: Vec::new(),
        }
    }
}

/// Client configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// Daemon host to connect to
    pub daemon_host: String,
    /// Daemon port to connect to
    pub daemon_port: u16,
    /// Connection timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            daemon_host: "127.0.0.1".to_string(),
            daemon_port: 50051,
            timeout_seconds: default_timeout(),
        }
    }
}

fn default_timeout() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemars::schema_for;

    #[test]
    fn test_message_serialization() {
        let msg = Message::Stop {
            name: "web".to_string(),
            force: true,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"type":"stop","name":"web","force":true}"#);
    }

    #[test]
    fn test_response_serialization() {
        let resp = Response::Ok {
            message: "success".to_string(),
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("success"));
        assert!(!resp.is_error());
    }

    #[test]
    fn test_schema_generation() {
        let _message_schema = schema_for!(Message);
        let _response_schema = schema_for!(Response);
        let _daemon_config_schema = schema_for!(DaemonConfig);
        let _client_config_schema = schema_for!(ClientConfig);
    }

    #[test]
    fn test_default_configs() {
        let daemon_config = DaemonConfig::default();
        assert_eq!(daemon_config.host, "127.0.0.1");
        assert_eq!(daemon_config.port, 50051);
        assert_eq!(daemon_config.log_capacity, 100);
        assert_eq!(daemon_config.restart_delay_ms, 1000);
        assert!(daemon_config.distribute_stderr);

        let client_config = ClientConfig::default();
        assert_eq!(client_config.daemon_host, "127.0.0.1");
        assert_eq!(client_config.daemon_port, 50051);
    }

    #[test]
    fn test_partial_daemon_config_uses_defaults() {
        let cfg: DaemonConfig = serde_json::from_str(r#"{"port": 6000}"#).unwrap();
        assert_eq!(cfg.port, 6000);
        assert_eq!(cfg.host, "127.0.0.1");
        assert!(cfg.processes.is_empty());
    }
}
