// src/model.rs

//! Persisted task records.
//!
//! These are plain data: the only way their `status` changes is through a
//! legal transition of the matching state machine, applied by
//! [`ScanService`](crate::service::ScanService) or the
//! [`Reconciler`](crate::reconcile::Reconciler).

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::ConfigFile;
use crate::errors::{Result, ScanflowError};
use crate::subtask::SubScanTaskStatus;
use crate::task::ScanTaskStatus;

/// Identifier of a [`ScanTask`].
pub type TaskId = String;

/// Identifier of a [`SubScanTask`].
pub type SubtaskId = String;

/// Fresh random identifier.
pub fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Parent record: one per scan request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanTask {
    pub id: TaskId,
    pub name: String,
    #[serde(default)]
    pub project_id: Option<String>,
    pub scanner: String,
    pub status: ScanTaskStatus,
    pub created_by: String,
    pub created_date: DateTime<Utc>,
    pub last_modified_date: DateTime<Utc>,
    #[serde(default)]
    pub start_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_date_time: Option<DateTime<Utc>>,
    /// Number of sub-tasks submitted for this task.
    #[serde(default)]
    pub total: u64,
    /// Sub-tasks that reached a terminal state.
    #[serde(default)]
    pub scanned: u64,
    #[serde(default)]
    pub failed: u64,
    #[serde(default)]
    pub stop_reason: Option<String>,
}

impl ScanTask {
    pub fn new(
        name: impl Into<String>,
        scanner: impl Into<String>,
        created_by: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            project_id: None,
            scanner: scanner.into(),
            status: ScanTaskStatus::Pending,
            created_by: created_by.into(),
            created_date: now,
            last_modified_date: now,
            start_date_time: None,
            finished_date_time: None,
            total: 0,
            scanned: 0,
            failed: 0,
            stop_reason: None,
        }
    }

    /// Seconds since the last write, as seen at `now`.
    pub fn idle_seconds(&self, now: DateTime<Utc>) -> i64 {
        (now - self.last_modified_date).num_seconds()
    }
}

/// One unit of work: an artifact paired with a scanner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubScanTask {
    pub id: SubtaskId,
    pub parent_scan_task_id: TaskId,
    pub project_id: String,
    /// Artifact path inside its repository.
    pub full_path: String,
    #[serde(default)]
    pub sha256: Option<String>,
    pub scanner: String,
    pub status: SubScanTaskStatus,
    /// Times the sub-task has been pulled by a worker.
    #[serde(default)]
    pub executed_times: u32,
    /// Times the sub-task was sent back to `CREATED` after a timeout.
    #[serde(default)]
    pub retry_times: u32,
    pub created_date: DateTime<Utc>,
    pub last_modified_date: DateTime<Utc>,
    #[serde(default)]
    pub start_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub heartbeat_date_time: Option<DateTime<Utc>>,
    /// Deadline of the current run; only set while pulled or executing.
    #[serde(default)]
    pub timeout_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_date_time: Option<DateTime<Utc>>,
    /// Human readable explanation of the last terminal transition.
    #[serde(default)]
    pub reason: Option<String>,
}

impl SubScanTask {
    pub fn new(
        parent: &ScanTask,
        project_id: impl Into<String>,
        full_path: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: new_id(),
            parent_scan_task_id: parent.id.clone(),
            project_id: project_id.into(),
            full_path: full_path.into(),
            sha256: None,
            scanner: parent.scanner.clone(),
            status: SubScanTaskStatus::NeverScanned,
            executed_times: 0,
            retry_times: 0,
            created_date: now,
            last_modified_date: now,
            start_date_time: None,
            heartbeat_date_time: None,
            timeout_date_time: None,
            finished_date_time: None,
            reason: None,
        }
    }

    /// Drop the fields that only make sense while a worker holds the sub-task.
    pub fn clear_run_window(&mut self) {
        self.heartbeat_date_time = None;
        self.timeout_date_time = None;
    }
}

/// Snapshot of every record in a store, used to seed and dump the in-memory
/// store from the command line.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub tasks: Vec<ScanTask>,
    #[serde(default)]
    pub subtasks: Vec<SubScanTask>,
}

/// Resolved scanner definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Scanner {
    pub name: String,
    pub kind: String,
    pub version: Option<String>,
    /// Budget of a single run before the sub-task counts as timed out.
    pub max_scan_duration: Duration,
}

/// Scanners known to this process, keyed by name.
#[derive(Debug, Clone)]
pub struct ScannerRegistry {
    scanners: BTreeMap<String, Scanner>,
    default_scan_duration: Duration,
}

impl ScannerRegistry {
    pub fn new(default_scan_duration: Duration) -> Self {
        Self {
            scanners: BTreeMap::new(),
            default_scan_duration,
        }
    }

    /// Build the registry from `[scanner.*]`, falling back to
    /// `[scheduler].execute_timeout` for scanners without a budget.
    pub fn from_config(cfg: &ConfigFile) -> Self {
        let default = cfg.scheduler.execute_timeout;
        let mut registry = Self::new(default);
        for scanner in cfg.scanners.values() {
            registry.register(Scanner {
                name: scanner.name.clone(),
                kind: scanner.kind.clone(),
                version: scanner.version.clone(),
                max_scan_duration: scanner.max_scan_duration.unwrap_or(default),
            });
        }
        registry
    }

    pub fn register(&mut self, scanner: Scanner) -> &mut Self {
        self.scanners.insert(scanner.name.clone(), scanner);
        self
    }

    pub fn get(&self, name: &str) -> Result<&Scanner> {
        self.scanners
            .get(name)
            .ok_or_else(|| ScanflowError::ScannerNotFound(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.scanners.keys().map(String::as_str)
    }

    /// Run budget for `name`; unknown scanners get the default.
    pub fn max_scan_duration(&self, name: &str) -> Duration {
        self.scanners
            .get(name)
            .map(|s| s.max_scan_duration)
            .unwrap_or(self.default_scan_duration)
    }

    /// Everything a worker needs to run `subtask` again.
    pub fn runtime_for(&self, subtask: &SubScanTask) -> Result<SubtaskRuntime> {
        let scanner = self.get(&subtask.scanner)?.clone();
        Ok(SubtaskRuntime {
            subtask_id: subtask.id.clone(),
            parent_scan_task_id: subtask.parent_scan_task_id.clone(),
            project_id: subtask.project_id.clone(),
            full_path: subtask.full_path.clone(),
            sha256: subtask.sha256.clone(),
            scanner,
        })
    }
}

/// A sub-task joined with its resolved scanner, handed to the dispatcher on
/// redispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubtaskRuntime {
    pub subtask_id: SubtaskId,
    pub parent_scan_task_id: TaskId,
    pub project_id: String,
    pub full_path: String,
    pub sha256: Option<String>,
    pub scanner: Scanner,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ScannerRegistry {
        let mut registry = ScannerRegistry::new(Duration::from_secs(1200));
        registry.register(Scanner {
            name: "trivy".to_string(),
            kind: "trivy".to_string(),
            version: None,
            max_scan_duration: Duration::from_secs(600),
        });
        registry
    }

    #[test]
    fn unknown_scanner_uses_default_budget() {
        let registry = registry();
        assert_eq!(registry.max_scan_duration("trivy"), Duration::from_secs(600));
        assert_eq!(registry.max_scan_duration("other"), Duration::from_secs(1200));
    }

    #[test]
    fn runtime_requires_known_scanner() {
        let now = Utc::now();
        let mut task = ScanTask::new("nightly", "missing", "admin", now);
        let sub = SubScanTask::new(&task, "proj", "/a.jar", now);
        assert!(matches!(
            registry().runtime_for(&sub),
            Err(ScanflowError::ScannerNotFound(_))
        ));

        task.scanner = "trivy".to_string();
        let sub = SubScanTask::new(&task, "proj", "/a.jar", now);
        let runtime = registry().runtime_for(&sub).unwrap();
        assert_eq!(runtime.scanner.name, "trivy");
        assert_eq!(runtime.parent_scan_task_id, task.id);
    }
}
