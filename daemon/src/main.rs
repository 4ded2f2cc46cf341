//! droverd: the drover supervisor daemon
//!
//! Loads the configuration, launches the configured processes and serves
//! client requests until SIGINT or SIGTERM.

use clap::Parser;
use daemon::bootstrap::{apply_overrides, bootstrap};
use daemon::Daemon;
use drover_core::config::load_config_from_toml_path;
use drover_core::utils::init_tracing;
use schema::DaemonConfig;
use std::path::PathBuf;
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(name = "droverd", version, about = "drover process supervisor daemon")]
struct Args {
    /// TOML configuration file
    #[arg(long, env = "DROVER_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (0 picks a free port)
    #[arg(long)]
    port: Option<u16>,

    /// Log level used when RUST_LOG is unset
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> daemon::Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config_from_toml_path(path)?,
        None => DaemonConfig::default(),
    };
    let config = apply_overrides(config, args.host, args.port, args.log_level);
    init_tracing(&config.log_level)?;

    info!("Starting drover daemon");
    let (daemon, listener) = bootstrap(config).await?;

    let signalled = daemon.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Shutdown signal received");
        signalled.stop();
    });

    let served = daemon.serve(listener).await;
    shutdown(&daemon).await;

    if let Err(e) = &served {
        error!("Daemon failed: {}", e);
    }
    served
}

async fn shutdown(daemon: &Daemon) {
    info!("Stopping {} supervised processes", daemon.manager().len());
    daemon.manager().shutdown().await;
    info!("Daemon stopped");
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(e) => {
            warn!("Cannot install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
