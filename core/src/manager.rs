//! Supervision facade
//!
//! [`ProcessManager`] is the entry point used by the daemon. It owns the
//! [`ProcessRegistry`], one [`SupervisorHandle`] and one [`LogDistributor`]
//! per record, and the process adapter shared by all supervisors.
//!
//! Locking: the slot map is always taken before the registry, and neither
//! lock is held across an `.await`.

use crate::logging::{LogDistributor, LogSubscription};
use crate::registry::{ProcessRecord, ProcessRegistry};
use crate::supervisor::{
    normalize_policy, spawn_supervisor, ProcessAdapter, SupervisorConfig, SupervisorHandle,
};
use crate::{CoreError, Result};
use schema::{DaemonConfig, ProcessInfo, ProcessSpec, StartRequest};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info};

/// Tunables of the supervision engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Lines retained per process
    pub log_capacity: usize,
    /// Delay before a relaunch
    pub restart_delay: Duration,
    /// Poll interval of following log streams
    pub log_poll_interval: Duration,
    /// Grace period between SIGTERM and SIGKILL
    pub shutdown_timeout: Duration,
    /// Include stderr in log streams
    pub distribute_stderr: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self::from(&DaemonConfig::default())
    }
}

impl From<&DaemonConfig> for ManagerConfig {
    fn from(config: &DaemonConfig) -> Self {
        Self {
            log_capacity: config.log_capacity,
            restart_delay: Duration::from_millis(config.restart_delay_ms),
            log_poll_interval: Duration::from_millis(config.log_poll_interval_ms),
            shutdown_timeout: Duration::from_secs(config.shutdown_timeout_secs),
            distribute_stderr: config.distribute_stderr,
        }
    }
}

struct ProcessSlot {
    handle: SupervisorHandle,
    logs: Arc<LogDistributor>,
}

/// Public start/stop/list/get/stream-logs/remove operations
pub struct ProcessManager {
    registry: Arc<ProcessRegistry>,
    slots: Mutex<HashMap<String, ProcessSlot>>,
    process_adapter: Arc<dyn ProcessAdapter>,
    config: ManagerConfig,
}

impl std::fmt::Debug for ProcessManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessManager")
            .field("processes", &self.registry.len())
            .field("config", &self.config)
            .finish()
    }
}

impl ProcessManager {
    /// Create a manager with an empty registry
    pub fn new(process_adapter: Arc<dyn ProcessAdapter>, config: ManagerConfig) -> Self {
        Self {
            registry: Arc::new(ProcessRegistry::new()),
            slots: Mutex::new(HashMap::new()),
            process_adapter,
            config,
        }
    }

    /// Create a manager spawning real Unix processes
    #[cfg(unix)]
    pub fn unix(config: ManagerConfig) -> Self {
        Self::new(Arc::new(crate::supervisor::UnixProcessAdapter::new()), config)
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<String, ProcessSlot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The registry backing this manager
    pub fn registry(&self) -> &Arc<ProcessRegistry> {
        &self.registry
    }

    /// Register a new record and launch its supervisor.
    ///
    /// Returns as soon as the record is registered; the returned status is
    /// usually still `starting`. Unknown restart policies fall back to
    /// `never`.
    pub fn start(&self, request: StartRequest) -> Result<ProcessInfo> {
        if request.name.trim().is_empty() {
            return Err(CoreError::ValidationError("name cannot be empty".to_string()));
        }
        if request.command.trim().is_empty() {
            return Err(CoreError::ValidationError("command cannot be empty".to_string()));
        }

        let spec = ProcessSpec {
            restart_policy: normalize_policy(&request.restart_policy),
            name: request.name,
            command: request.command,
            args: request.args,
        };
        let record = ProcessRecord::new(&spec);
        let info = record.to_info(false);

        let mut slots = self.slots();
        self.registry.register(record)?;

        let logs = Arc::new(LogDistributor::new(
            spec.name.clone(),
            self.config.log_capacity,
            self.config.log_poll_interval,
        ));
        let name = spec.name.clone();
        let handle = spawn_supervisor(SupervisorConfig {
            spec,
            process_adapter: self.process_adapter.clone(),
            registry: self.registry.clone(),
            logs: logs.clone(),
            restart_delay: self.config.restart_delay,
            shutdown_timeout: self.config.shutdown_timeout,
            distribute_stderr: self.config.distribute_stderr,
        });
        slots.insert(name.clone(), ProcessSlot { handle, logs });
        drop(slots);

        info!("Registered process '{}'", name);
        Ok(info)
    }

    /// Stop a process; `force` kills instead of terminating.
    ///
    /// `NotFound` for unknown names, `NotRunning` when the record is
    /// already terminal.
    pub async fn stop(&self, name: &str, force: bool) -> Result<()> {
        let handle = self
            .slots()
            .get(name)
            .map(|slot| slot.handle.clone())
            .ok_or_else(|| CoreError::NotFound(name.to_string()))?;
        handle.stop(force).await
    }

    /// Snapshot of every record
    pub fn list(&self, verbose: bool) -> Vec<ProcessInfo> {
        self.registry
            .snapshot()
            .iter()
            .map(|record| record.to_info(verbose))
            .collect()
    }

    /// Copy of one record
    pub fn get(&self, name: &str) -> Result<ProcessRecord> {
        self.registry.get(name)
    }

    /// Subscribe to a process's captured output
    pub fn stream_logs(&self, name: &str, follow: bool) -> Result<LogSubscription> {
        self.slots()
            .get(name)
            .map(|slot| slot.logs.subscribe(follow))
            .ok_or_else(|| CoreError::NotFound(name.to_string()))
    }

    /// Forget a record that is no longer running
    ///
    /// Fails with `InvalidState` while the process is starting, running or
    /// waiting to be relaunched. A stopped record whose process is still
    /// being reaped waits for its supervisor to end first.
    pub async fn remove(&self, name: &str) -> Result<()> {
        let handle = {
            let slots = self.slots();
            let record = self.registry.get(name)?;
            if record.is_active() {
                return Err(CoreError::InvalidState(format!(
                    "process '{}' is {}; stop it before removing",
                    name, record.status
                )));
            }
            slots.get(name).map(|slot| slot.handle.clone())
        };

        if let Some(handle) = handle.filter(|h| !h.is_finished()) {
            debug!("Waiting for supervisor of '{}' before removal", name);
            handle.shutdown().await;
        }

        let mut slots = self.slots();
        self.registry.remove(name)?;
        if slots.remove(name).is_none() {
            debug!("No supervisor slot for removed process '{}'", name);
        }
        info!("Removed process '{}'", name);
        Ok(())
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Stop every supervised process and wait for the supervisors to end
    pub async fn shutdown(&self) {
        let handles: Vec<SupervisorHandle> = self
            .slots()
            .values()
            .map(|slot| slot.handle.clone())
            .collect();
        info!("Shutting down {} supervisors", handles.len());

        let tasks: Vec<_> = handles
            .into_iter()
            .map(|handle| tokio::spawn(async move { handle.shutdown().await }))
            .collect();
        for task in tasks {
            let _ = task.await;
        }
    }
}
