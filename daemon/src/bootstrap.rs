//! Daemon bootstrap: build the facade, launch configured processes, bind
//!
//! [`bootstrap`] is the composition root of `droverd`. The registry lives
//! inside the [`ProcessManager`] it creates; nothing is process-global.

use crate::{Daemon, Result};
use drover_core::config::validate_config;
use drover_core::{ManagerConfig, ProcessManager};
use schema::DaemonConfig;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Build the daemon for `config` and bind its listener.
///
/// Every entry of `config.processes` is started before the listener is
/// bound. A process that cannot be registered is logged and skipped; a
/// failed spawn is recorded on its record like any other exit.
pub async fn bootstrap(config: DaemonConfig) -> Result<(Daemon, TcpListener)> {
    validate_config(&config)?;

    let manager = Arc::new(ProcessManager::unix(ManagerConfig::from(&config)));
    for request in config.processes.iter().cloned() {
        let name = request.name.clone();
        match manager.start(request) {
            Ok(_) => info!("Launched configured process '{}'", name),
            Err(e) => warn!("Skipping configured process '{}': {}", name, e),
        }
    }

    let daemon = Daemon::new(config, manager);
    let listener = match daemon.bind().await {
        Ok(listener) => listener,
        Err(e) => {
            daemon.manager().shutdown().await;
            return Err(e);
        }
    };
    Ok((daemon, listener))
}

/// Apply command-line overrides on top of a loaded configuration
pub fn apply_overrides(
    mut config: DaemonConfig,
    host: Option<String>,
    port: Option<u16>,
    log_level: Option<String>,
) -> DaemonConfig {
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }
    if let Some(level) = log_level {
        config.log_level = level;
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_win() {
        let config = apply_overrides(
            DaemonConfig::default(),
            Some("0.0.0.0".to_string()),
            Some(7000),
            None,
        );
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 7000);
        assert_eq!(config.log_level, "info");
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let config = DaemonConfig {
            max_connections: 0,
            ..DaemonConfig::default()
        };
        let err = bootstrap(config).await.unwrap_err();
        assert_eq!(err.code(), "CORE002");
    }
}
