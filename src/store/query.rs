// src/store/query.rs

//! Claim predicates.
//!
//! A query always includes the current status, so once a claimed record has
//! been transitioned it no longer matches on the next sweep.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::clock::instant_before;
use crate::model::{ScanTask, SubScanTask};
use crate::subtask::SubScanTaskStatus;
use crate::task::ScanTaskStatus;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskQuery {
    /// PENDING or SCANNING_SUBMITTING, untouched since before `before`.
    SubmitTimedOut { before: DateTime<Utc> },
    /// Every task in `status`.
    Status(ScanTaskStatus),
}

impl TaskQuery {
    pub fn matches(&self, task: &ScanTask) -> bool {
        match self {
            TaskQuery::SubmitTimedOut { before } => {
                ScanTaskStatus::SUBMITTING.contains(&task.status)
                    && task.last_modified_date < *before
            }
            TaskQuery::Status(status) => task.status == *status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubtaskQuery {
    /// BLOCKED, untouched since before `before`.
    BlockTimedOut { before: DateTime<Utc> },
    /// PULLED or EXECUTING and past its deadline, with a stale heartbeat, or
    /// older than `max_task_duration`. Zero durations disable their check.
    ExecutionTimedOut {
        now: DateTime<Utc>,
        heartbeat_timeout: Duration,
        max_task_duration: Duration,
    },
    /// CREATED, waiting for a worker.
    Ready,
    /// BLOCKED sub-tasks of one project.
    BlockedInProject { project_id: String },
}

impl SubtaskQuery {
    pub fn matches(&self, subtask: &SubScanTask) -> bool {
        match self {
            SubtaskQuery::BlockTimedOut { before } => {
                subtask.status == SubScanTaskStatus::Blocked
                    && subtask.last_modified_date < *before
            }
            SubtaskQuery::ExecutionTimedOut {
                now,
                heartbeat_timeout,
                max_task_duration,
            } => {
                if !subtask.status.is_running() {
                    return false;
                }
                let past_deadline = subtask.timeout_date_time.is_some_and(|t| t < *now);
                let stale_heartbeat = !heartbeat_timeout.is_zero()
                    && subtask
                        .heartbeat_date_time
                        .is_some_and(|h| h < instant_before(*now, *heartbeat_timeout));
                let too_old = !max_task_duration.is_zero()
                    && subtask.created_date < instant_before(*now, *max_task_duration);
                past_deadline || stale_heartbeat || too_old
            }
            SubtaskQuery::Ready => subtask.status == SubScanTaskStatus::Created,
            SubtaskQuery::BlockedInProject { project_id } => {
                subtask.status == SubScanTaskStatus::Blocked && subtask.project_id == *project_id
            }
        }
    }
}
