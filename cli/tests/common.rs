//! Test utilities for CLI crate integration tests.

use daemon::bootstrap::bootstrap;
use daemon::Daemon;
use schema::{ClientConfig, DaemonConfig};
use std::time::Duration;

/// Run the given future with a timeout, failing the test if it elapses.
///
/// # Panics
///
/// Panics if the timeout elapses before the future completes.
pub async fn run_with_timeout<F, T>(duration: Duration, fut: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(duration, fut)
        .await
        .expect("test timed out")
}

/// Serve a fresh daemon on an ephemeral port and return a matching client config
pub async fn spawn_daemon() -> (Daemon, ClientConfig) {
    let config = DaemonConfig {
        port: 0,
        log_poll_interval_ms: 20,
        shutdown_timeout_secs: 2,
        ..DaemonConfig::default()
    };
    let (daemon, listener) = bootstrap(config).await.expect("bootstrap");
    let port = listener.local_addr().expect("local addr").port();

    let serving = daemon.clone();
    tokio::spawn(async move { serving.serve(listener).await });

    let client = ClientConfig {
        daemon_host: "127.0.0.1".to_string(),
        daemon_port: port,
        timeout_seconds: 5,
    };
    (daemon, client)
}
