//! Test utilities for integration tests in the daemon crate.

#![allow(dead_code)]

use daemon::bootstrap::bootstrap;
use daemon::Daemon;
use ipc::IpcClient;
use schema::{DaemonConfig, StartRequest};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Run the given future with a timeout, failing the test if it elapses.
pub async fn run_with_timeout<F, T>(duration: Duration, fut: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(duration, fut)
        .await
        .expect("test timed out")
}

/// A bootstrapped daemon serving on an ephemeral loopback port
pub struct TestDaemon {
    pub daemon: Daemon,
    pub port: u16,
    server: JoinHandle<daemon::Result<()>>,
}

impl TestDaemon {
    /// Bootstrap with `processes` preconfigured and start serving
    pub async fn start(processes: Vec<StartRequest>) -> Self {
        let config = DaemonConfig {
            port: 0,
            restart_delay_ms: 200,
            log_poll_interval_ms: 20,
            shutdown_timeout_secs: 2,
            processes,
            ..DaemonConfig::default()
        };
        let (daemon, listener) = bootstrap(config).await.expect("bootstrap");
        let port = listener.local_addr().expect("local addr").port();

        let serving = daemon.clone();
        let server = tokio::spawn(async move { serving.serve(listener).await });
        Self {
            daemon,
            port,
            server,
        }
    }

    pub fn client(&self) -> IpcClient {
        IpcClient::new("127.0.0.1", self.port).with_timeout(Duration::from_secs(5))
    }

    /// Stop serving and shut every supervised process down
    pub async fn shutdown(self) {
        self.daemon.shutdown().await;
        run_with_timeout(Duration::from_secs(5), self.server)
            .await
            .expect("server task")
            .expect("serve");
    }
}

pub fn request(name: &str, command: &str, args: &[&str], policy: &str) -> StartRequest {
    StartRequest {
        name: name.to_string(),
        command: command.to_string(),
        args: args.iter().map(|s| s.to_string()).collect(),
        restart_policy: policy.to_string(),
    }
}
