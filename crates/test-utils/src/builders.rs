#![allow(dead_code)]

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use scanflow::config::{ConfigFile, RawConfigFile, RawScannerSection, RawSchedulerSection};
use scanflow::model::{ScanTask, SubScanTask};
use scanflow::subtask::SubScanTaskStatus;
use scanflow::task::ScanTaskStatus;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    /// Defaults plus one `trivy` scanner.
    pub fn new() -> Self {
        Self::empty().with_scanner("trivy", "trivy", None)
    }

    /// Defaults and no scanners.
    pub fn empty() -> Self {
        Self {
            config: RawConfigFile {
                scheduler: RawSchedulerSection::default(),
                scanner: BTreeMap::new(),
            },
        }
    }

    pub fn with_scanner(mut self, name: &str, kind: &str, max_scan_duration: Option<&str>) -> Self {
        self.config.scanner.insert(
            name.to_string(),
            RawScannerSection {
                kind: kind.to_string(),
                version: None,
                max_scan_duration: max_scan_duration.map(str::to_string),
            },
        );
        self
    }

    pub fn fixed_delay(mut self, value: &str) -> Self {
        self.config.scheduler.fixed_delay = value.to_string();
        self
    }

    pub fn submit_timeout(mut self, value: &str) -> Self {
        self.config.scheduler.submit_timeout = value.to_string();
        self
    }

    pub fn block_timeout(mut self, value: &str) -> Self {
        self.config.scheduler.block_timeout = value.to_string();
        self
    }

    pub fn execute_timeout(mut self, value: &str) -> Self {
        self.config.scheduler.execute_timeout = value.to_string();
        self
    }

    pub fn heartbeat_timeout(mut self, value: &str) -> Self {
        self.config.scheduler.heartbeat_timeout = value.to_string();
        self
    }

    pub fn max_execute_times(mut self, value: u32) -> Self {
        self.config.scheduler.max_execute_times = value;
        self
    }

    pub fn page_size(mut self, value: usize) -> Self {
        self.config.scheduler.page_size = value;
        self
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `ScanTask` records placed straight into a store.
pub struct ScanTaskBuilder {
    task: ScanTask,
}

impl ScanTaskBuilder {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            task: ScanTask::new("test-scan", "trivy", "tester", now),
        }
    }

    pub fn id(mut self, id: &str) -> Self {
        self.task.id = id.to_string();
        self
    }

    pub fn scanner(mut self, scanner: &str) -> Self {
        self.task.scanner = scanner.to_string();
        self
    }

    pub fn status(mut self, status: ScanTaskStatus) -> Self {
        self.task.status = status;
        self
    }

    /// Sets the last write time, which is what the submit sweep looks at.
    pub fn last_modified(mut self, at: DateTime<Utc>) -> Self {
        self.task.last_modified_date = at;
        self
    }

    pub fn total(mut self, total: u64) -> Self {
        self.task.total = total;
        self
    }

    pub fn build(self) -> ScanTask {
        self.task
    }
}

/// Builder for `SubScanTask` records placed straight into a store.
pub struct SubScanTaskBuilder {
    subtask: SubScanTask,
}

impl SubScanTaskBuilder {
    pub fn new(parent: &ScanTask, now: DateTime<Utc>) -> Self {
        Self {
            subtask: SubScanTask::new(parent, "test-project", "/lib/artifact.jar", now),
        }
    }

    pub fn id(mut self, id: &str) -> Self {
        self.subtask.id = id.to_string();
        self
    }

    pub fn project(mut self, project_id: &str) -> Self {
        self.subtask.project_id = project_id.to_string();
        self
    }

    pub fn scanner(mut self, scanner: &str) -> Self {
        self.subtask.scanner = scanner.to_string();
        self
    }

    pub fn status(mut self, status: SubScanTaskStatus) -> Self {
        self.subtask.status = status;
        self
    }

    pub fn created(mut self, at: DateTime<Utc>) -> Self {
        self.subtask.created_date = at;
        self
    }

    pub fn last_modified(mut self, at: DateTime<Utc>) -> Self {
        self.subtask.last_modified_date = at;
        self
    }

    pub fn executed_times(mut self, times: u32) -> Self {
        self.subtask.executed_times = times;
        self
    }

    /// Marks the sub-task as held by a worker whose run ends at `deadline`.
    pub fn running_until(mut self, status: SubScanTaskStatus, deadline: DateTime<Utc>) -> Self {
        self.subtask.status = status;
        self.subtask.heartbeat_date_time = Some(self.subtask.last_modified_date);
        self.subtask.timeout_date_time = Some(deadline);
        self
    }

    pub fn build(self) -> SubScanTask {
        self.subtask
    }
}
