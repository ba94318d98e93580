// src/store/mod.rs

//! Persistence contract for scan tasks and sub-tasks.
//!
//! The store is the mutual-exclusion boundary of the subsystem: every
//! transition happens inside one of its read-modify-write or claim calls,
//! never as a separate read followed by a write.
//!
//! Closures handed to the store receive a mutable copy of the record. The copy
//! replaces the stored record only when the closure returns `Ok`, so a failing
//! action leaves the record untouched.

pub mod memory;
pub mod query;

use std::fmt::Debug;

use chrono::{DateTime, Utc};

use crate::errors::{Result, ScanflowError};
use crate::model::{ScanTask, StoreSnapshot, SubScanTask, SubtaskId};

pub use memory::InMemoryTaskStore;
pub use query::{SubtaskQuery, TaskQuery};

/// Mutation applied to a task inside the store's unit of work.
pub type TaskUpdate<'a> = dyn FnMut(&mut ScanTask) -> Result<()> + 'a;

/// Mutation applied to a sub-task inside the store's unit of work.
pub type SubtaskUpdate<'a> = dyn FnMut(&mut SubScanTask) -> Result<()> + 'a;

/// Per-record result of a claim-all call.
#[derive(Debug)]
pub enum ClaimOutcome {
    /// The update was committed; carries the stored record.
    Applied(SubScanTask),
    /// The update failed and the record was left as it was.
    Failed { id: SubtaskId, error: ScanflowError },
}

impl ClaimOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, ClaimOutcome::Applied(_))
    }
}

pub trait TaskStore: Send + Sync + Debug {
    fn insert_task(&self, task: ScanTask) -> Result<()>;

    fn insert_subtask(&self, subtask: SubScanTask) -> Result<()>;

    fn get_task(&self, id: &str) -> Result<ScanTask>;

    fn get_subtask(&self, id: &str) -> Result<SubScanTask>;

    fn list_tasks(&self) -> Result<Vec<ScanTask>>;

    /// Sub-tasks of `parent`, oldest first.
    fn list_subtasks(&self, parent: &str) -> Result<Vec<SubScanTask>>;

    /// Sub-tasks matching `query`, oldest first, without claiming them.
    fn find_subtasks(&self, query: &SubtaskQuery, limit: usize) -> Result<Vec<SubScanTask>>;

    /// Atomic read-modify-write of one task.
    fn update_task(&self, id: &str, update: &mut TaskUpdate<'_>) -> Result<ScanTask>;

    /// Atomic read-modify-write of one sub-task.
    fn update_subtask(&self, id: &str, update: &mut SubtaskUpdate<'_>) -> Result<SubScanTask>;

    /// Find the oldest task matching `query` and apply `update` in the same
    /// unit of work. `Ok(None)` when nothing matches.
    fn claim_task(
        &self,
        query: &TaskQuery,
        update: &mut TaskUpdate<'_>,
    ) -> Result<Option<ScanTask>>;

    /// Apply `update` to every sub-task matching `query`, reading at most
    /// `page_size` candidates at a time. Each record is re-checked and
    /// committed on its own.
    fn claim_subtasks(
        &self,
        query: &SubtaskQuery,
        page_size: usize,
        update: &mut SubtaskUpdate<'_>,
    ) -> Result<Vec<ClaimOutcome>>;

    /// Claim the oldest sub-task matching `query`. `Ok(None)` when nothing
    /// matches.
    fn claim_first_subtask(
        &self,
        query: &SubtaskQuery,
        update: &mut SubtaskUpdate<'_>,
    ) -> Result<Option<SubScanTask>>;

    /// Claim one specific sub-task, but only while it still matches `query`.
    /// `Ok(None)` when another caller got there first.
    fn claim_subtask(
        &self,
        id: &str,
        query: &SubtaskQuery,
        update: &mut SubtaskUpdate<'_>,
    ) -> Result<Option<SubScanTask>>;

    /// Refresh the heartbeat of a PULLED or EXECUTING sub-task. Returns
    /// `false` when the sub-task is not running.
    fn heartbeat(&self, id: &str, now: DateTime<Utc>) -> Result<bool>;

    fn snapshot(&self) -> Result<StoreSnapshot>;
}
