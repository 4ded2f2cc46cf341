//! Lifecycle supervision of managed processes
//!
//! Every Process Record gets exactly one tokio task, the
//! [`ProcessSupervisor`], which owns the OS process handle for as long as the
//! record is supervised:
//!
//! ```text
//! Starting → Running → Exited ─(policy: relaunch, after delay)→ Starting
//!                        └─(policy: halt)→ terminal Exited
//! any ─(stop)→ Stopped
//! ```
//!
//! ## Components
//!
//! - [`SupervisorHandle`]: control interface for one supervised process
//! - [`ControlMsg`]: messages handled by the supervisor task
//! - [`ProcessAdapter`]: trait for abstracting process management
//! - [`decide`]: the restart policy decision
//!
//! The task ends once the record reaches a terminal state; the handle then
//! reports [`CoreError::NotRunning`](crate::CoreError::NotRunning) for stops.

use crate::logging::LogDistributor;
use crate::registry::ProcessRegistry;
use crate::{CoreError, Result};
use schema::{ProcessSpec, ProcessStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::info;

pub mod adapters;
pub mod process_task;
pub mod restart_policy;

pub use adapters::*;
pub use process_task::*;
pub use restart_policy::*;

/// Control messages for a supervisor task
#[derive(Debug)]
pub enum ControlMsg {
    /// Signal the process and mark the record stopped
    Stop {
        /// SIGKILL instead of SIGTERM
        force: bool,
        /// Outcome of the request
        response: oneshot::Sender<Result<()>>,
    },
    /// Terminate the process (SIGTERM, then SIGKILL after the grace period)
    /// and end the task
    Shutdown {
        /// Signalled once the process is gone
        response: oneshot::Sender<()>,
    },
}

/// Handle for controlling a supervisor instance
#[derive(Debug, Clone)]
pub struct SupervisorHandle {
    name: String,
    control_tx: mpsc::UnboundedSender<ControlMsg>,
    status_rx: watch::Receiver<ProcessStatus>,
}

impl SupervisorHandle {
    /// Name of the supervised process
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Request a stop; `force` sends SIGKILL instead of SIGTERM.
    ///
    /// Fails with `NotRunning` once the record is terminal.
    pub async fn stop(&self, force: bool) -> Result<()> {
        let (response, response_rx) = oneshot::channel();
        self.control_tx
            .send(ControlMsg::Stop { force, response })
            .map_err(|_| CoreError::NotRunning(self.name.clone()))?;

        response_rx
            .await
            .map_err(|_| CoreError::NotRunning(self.name.clone()))?
    }

    /// Terminate the process if any and wait for the task to end
    pub async fn shutdown(&self) {
        let (response, response_rx) = oneshot::channel();
        if self.control_tx.send(ControlMsg::Shutdown { response }).is_ok() {
            let _ = response_rx.await;
        }
    }

    /// Whether the supervisor task has ended
    pub fn is_finished(&self) -> bool {
        self.control_tx.is_closed()
    }

    /// Get the latest published status
    pub fn current_status(&self) -> ProcessStatus {
        *self.status_rx.borrow()
    }

    /// Subscribe to status changes
    pub fn subscribe_to_status(&self) -> watch::Receiver<ProcessStatus> {
        self.status_rx.clone()
    }
}

/// Configuration for spawning a supervisor
pub struct SupervisorConfig {
    /// Launch specification
    pub spec: ProcessSpec,
    /// Process adapter for spawning and managing processes
    pub process_adapter: Arc<dyn ProcessAdapter>,
    /// Registry holding the record the supervisor updates
    pub registry: Arc<ProcessRegistry>,
    /// Destination of captured output
    pub logs: Arc<LogDistributor>,
    /// Delay between an exit and the relaunch
    pub restart_delay: Duration,
    /// Grace period between SIGTERM and SIGKILL
    pub shutdown_timeout: Duration,
    /// Forward stderr lines to `logs`
    pub distribute_stderr: bool,
}

/// Spawn the supervisor task for a registered record
///
/// The first launch is attempted immediately by the task; this function
/// returns without waiting for it.
pub fn spawn_supervisor(config: SupervisorConfig) -> SupervisorHandle {
    let (control_tx, control_rx) = mpsc::unbounded_channel();
    let (status_tx, status_rx) = watch::channel(ProcessStatus::Starting);

    let name = config.spec.name.clone();
    info!("Spawning supervisor for process '{}'", name);

    let supervisor = ProcessSupervisor::new(config, status_tx);
    tokio::spawn(supervisor.run(control_rx));

    SupervisorHandle {
        name,
        control_tx,
        status_rx,
    }
}
