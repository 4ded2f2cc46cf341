//! Configuration loading and validation for the drover daemon
//!
//! This module parses a TOML file into `schema::DaemonConfig`, relying on the
//! serde defaults of the schema type for omitted keys, and validates it with
//! field-path error messages.
//!
//! ```toml
//! port = 50051
//! logCapacity = 200
//!
//! [[processes]]
//! name = "web"
//! command = "python3"
//! args = ["-m", "http.server"]
//! restartPolicy = "on-failure"
//! ```

use crate::supervisor::parse_policy;
use crate::{CoreError, Result};
use schema::DaemonConfig;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Validate the configuration and return `Result<()>` with field-path errors
///
/// `port = 0` is accepted and binds an ephemeral port.
pub fn validate_config(config: &DaemonConfig) -> Result<()> {
    if config.host.trim().is_empty() {
        return Err(CoreError::ValidationError(
            "host: cannot be empty".to_string(),
        ));
    }
    if config.max_connections == 0 {
        return Err(CoreError::ValidationError(
            "maxConnections: must be > 0".to_string(),
        ));
    }
    if config.log_capacity == 0 {
        return Err(CoreError::ValidationError(
            "logCapacity: must be > 0".to_string(),
        ));
    }
    if config.log_poll_interval_ms == 0 {
        return Err(CoreError::ValidationError(
            "logPollIntervalMs: must be > 0".to_string(),
        ));
    }
    if config.shutdown_timeout_secs == 0 {
        return Err(CoreError::ValidationError(
            "shutdownTimeoutSecs: must be > 0".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for (i, process) in config.processes.iter().enumerate() {
        if process.name.trim().is_empty() {
            return Err(CoreError::ValidationError(format!(
                "processes[{}].name: cannot be empty",
                i
            )));
        }
        if !seen.insert(process.name.as_str()) {
            return Err(CoreError::ValidationError(format!(
                "processes[{}].name: duplicate name '{}'",
                i, process.name
            )));
        }
        if process.command.trim().is_empty() {
            return Err(CoreError::ValidationError(format!(
                "processes[{}].command: cannot be empty",
                i
            )));
        }
        // unknown policies are only tolerated on the wire
        if let Err(e) = parse_policy(&process.restart_policy) {
            return Err(CoreError::ValidationError(format!(
                "processes[{}].restartPolicy: {}",
                i, e
            )));
        }
    }

    debug!("Configuration validated successfully");
    Ok(())
}

/// Load the daemon configuration from a TOML file path
pub fn load_config_from_toml_path(path: impl AsRef<Path>) -> Result<DaemonConfig> {
    let data = fs::read_to_string(&path).map_err(|e| {
        CoreError::ConfigurationError(format!("Failed to read config {:?}: {}", path.as_ref(), e))
    })?;
    load_config_from_toml_str(&data)
}

/// Load the daemon configuration from a TOML string
pub fn load_config_from_toml_str(input: &str) -> Result<DaemonConfig> {
    let config: DaemonConfig = toml::from_str(input)
        .map_err(|e| CoreError::ConfigurationError(format!("TOML parse error: {}", e)))?;
    validate_config(&config)?;
    Ok(config)
}
