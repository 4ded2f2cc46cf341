//! Process records and the registry that maps names to them
//!
//! The registry is the single source of truth for what is managed. One mutex
//! guards the whole map; callers hold it only for the instant of a lookup or
//! field update, never across process I/O.

use crate::{CoreError, Result};
use schema::{ProcessInfo, ProcessSpec, ProcessStatus, RestartPolicy};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Bookkeeping for one managed process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRecord {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub restart_policy: RestartPolicy,
    /// OS pid of the current instance, `None` until a spawn succeeds
    pub pid: Option<u32>,
    pub status: ProcessStatus,
    pub last_exit_error: Option<String>,
    /// Relaunches performed so far
    pub restart_count: u32,
    /// Set while an exited record waits out the relaunch delay
    pub restart_pending: bool,
    pub started_at: Option<String>,
}

impl ProcessRecord {
    /// Fresh record in `Starting` status
    pub fn new(spec: &ProcessSpec) -> Self {
        Self {
            name: spec.name.clone(),
            command: spec.command.clone(),
            args: spec.args.clone(),
            restart_policy: spec.restart_policy,
            pid: None,
            status: ProcessStatus::Starting,
            last_exit_error: None,
            restart_count: 0,
            restart_pending: false,
            started_at: None,
        }
    }

    /// Launch specification this record was created from
    pub fn spec(&self) -> ProcessSpec {
        ProcessSpec {
            name: self.name.clone(),
            command: self.command.clone(),
            args: self.args.clone(),
            restart_policy: self.restart_policy,
        }
    }

    /// Whether the record has, or is about to get, a live OS process
    pub fn is_active(&self) -> bool {
        self.status.is_live() || self.restart_pending
    }

    /// Client-facing view; `verbose` fills the extended fields
    pub fn to_info(&self, verbose: bool) -> ProcessInfo {
        let mut info = ProcessInfo {
            name: self.name.clone(),
            pid: self.pid.unwrap_or(0),
            status: self.status,
            command: None,
            args: None,
            restart_policy: None,
            restarts: None,
            last_exit_error: None,
            started_at: None,
        };
        if verbose {
            info.command = Some(self.command.clone());
            info.args = Some(self.args.clone());
            info.restart_policy = Some(self.restart_policy);
            info.restarts = Some(self.restart_count);
            info.last_exit_error = self.last_exit_error.clone();
            info.started_at = self.started_at.clone();
        }
        info
    }
}

/// Mutex-guarded mapping from process name to [`ProcessRecord`]
#[derive(Debug, Default)]
pub struct ProcessRegistry {
    records: Mutex<HashMap<String, ProcessRecord>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // Every critical section leaves the map consistent, so a panic elsewhere
    // while holding the lock does not invalidate it.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, ProcessRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a record; an existing entry with the same name is left untouched
    pub fn register(&self, record: ProcessRecord) -> Result<()> {
        let mut records = self.lock();
        if records.contains_key(&record.name) {
            return Err(CoreError::AlreadyExists(record.name));
        }
        records.insert(record.name.clone(), record);
        Ok(())
    }

    /// Copy of the record named `name`
    pub fn get(&self, name: &str) -> Result<ProcessRecord> {
        self.lock()
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(name.to_string()))
    }

    /// Copies of every record, ordered by name
    pub fn snapshot(&self) -> Vec<ProcessRecord> {
        let mut records: Vec<_> = self.lock().values().cloned().collect();
        records.sort_by(|a, b| a.name.cmp(&b.name));
        records
    }

    /// Apply `f` to the record under the lock and return its result
    pub fn update<T>(&self, name: &str, f: impl FnOnce(&mut ProcessRecord) -> T) -> Result<T> {
        let mut records = self.lock();
        let record = records
            .get_mut(name)
            .ok_or_else(|| CoreError::NotFound(name.to_string()))?;
        Ok(f(record))
    }

    /// Remove and return the record
    pub fn remove(&self, name: &str) -> Result<ProcessRecord> {
        self.lock()
            .remove(name)
            .ok_or_else(|| CoreError::NotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str) -> ProcessRecord {
        ProcessRecord::new(&ProcessSpec {
            name: name.to_string(),
            command: "sleep".to_string(),
            args: vec!["1".to_string()],
            restart_policy: RestartPolicy::OnFailure,
        })
    }

    #[test]
    fn test_register_and_get() {
        let registry = ProcessRegistry::new();
        registry.register(record("a")).unwrap();

        let got = registry.get("a").unwrap();
        assert_eq!(got.status, ProcessStatus::Starting);
        assert_eq!(got.pid, None);
        assert!(got.is_active());
        assert!(matches!(registry.get("b"), Err(CoreError::NotFound(_))));
    }

    #[test]
    fn test_duplicate_register_keeps_original() {
        let registry = ProcessRegistry::new();
        registry.register(record("a")).unwrap();
        registry
            .update("a", |r| {
                r.pid = Some(10);
                r.status = ProcessStatus::Running;
            })
            .unwrap();

        let err = registry.register(record("a")).unwrap_err();
        assert!(matches!(err, CoreError::AlreadyExists(ref n) if n == "a"));

        let got = registry.get("a").unwrap();
        assert_eq!(got.pid, Some(10));
        assert_eq!(got.status, ProcessStatus::Running);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_snapshot_is_detached_copy() {
        let registry = ProcessRegistry::new();
        registry.register(record("b")).unwrap();
        registry.register(record("a")).unwrap();

        let snap = registry.snapshot();
        registry
            .update("a", |r| r.status = ProcessStatus::Stopped)
            .unwrap();

        let names: Vec<_> = snap.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(snap[0].status, ProcessStatus::Starting);
    }

    #[test]
    fn test_update_and_remove_unknown() {
        let registry = ProcessRegistry::new();
        assert!(matches!(
            registry.update("ghost", |_| ()),
            Err(CoreError::NotFound(_))
        ));
        assert!(matches!(registry.remove("ghost"), Err(CoreError::NotFound(_))));

        registry.register(record("a")).unwrap();
        let removed = registry.remove("a").unwrap();
        assert_eq!(removed.name, "a");
        assert!(registry.is_empty());
    }

    #[test]
    fn test_verbose_info() {
        let mut r = record("a");
        r.pid = Some(99);
        r.status = ProcessStatus::Exited;
        r.last_exit_error = Some("exit status 1".to_string());
        r.restart_count = 2;

        let brief = r.to_info(false);
        assert_eq!(brief.pid, 99);
        assert!(brief.command.is_none());
        assert!(brief.last_exit_error.is_none());

        let full = r.to_info(true);
        assert_eq!(full.command.as_deref(), Some("sleep"));
        assert_eq!(full.restarts, Some(2));
        assert_eq!(full.restart_policy, Some(RestartPolicy::OnFailure));
        assert_eq!(full.last_exit_error.as_deref(), Some("exit status 1"));
        assert!(!r.is_active());
    }
}
