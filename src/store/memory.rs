// src/store/memory.rs

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use tracing::{debug, trace};

use crate::errors::{Result, ScanflowError};
use crate::model::{ScanTask, StoreSnapshot, SubScanTask, SubtaskId, TaskId};
use crate::store::{
    ClaimOutcome, SubtaskQuery, SubtaskUpdate, TaskQuery, TaskStore, TaskUpdate,
};

#[derive(Debug, Default)]
struct Tables {
    tasks: BTreeMap<TaskId, ScanTask>,
    subtasks: BTreeMap<SubtaskId, SubScanTask>,
}

impl Tables {
    /// Ids of matching sub-tasks, oldest first, skipping `seen`.
    fn matching_subtasks(
        &self,
        query: &SubtaskQuery,
        seen: &HashSet<SubtaskId>,
        limit: usize,
    ) -> Vec<SubtaskId> {
        let mut matches: Vec<&SubScanTask> = self
            .subtasks
            .values()
            .filter(|s| !seen.contains(&s.id) && query.matches(s))
            .collect();
        matches.sort_by(|a, b| {
            a.created_date
                .cmp(&b.created_date)
                .then_with(|| a.id.cmp(&b.id))
        });
        matches.into_iter().take(limit).map(|s| s.id.clone()).collect()
    }

    fn apply_subtask(
        &mut self,
        id: &str,
        update: &mut SubtaskUpdate<'_>,
    ) -> Result<SubScanTask> {
        let stored = self
            .subtasks
            .get_mut(id)
            .ok_or_else(|| ScanflowError::SubtaskNotFound(id.to_string()))?;
        let mut copy = stored.clone();
        update(&mut copy)?;
        *stored = copy.clone();
        Ok(copy)
    }
}

/// Process-local [`TaskStore`].
///
/// A single mutex guards both tables, which makes every claim trivially
/// atomic. Good enough for one scheduler process and for tests.
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    tables: Mutex<Tables>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: StoreSnapshot) -> Result<Self> {
        let store = Self::new();
        for task in snapshot.tasks {
            store.insert_task(task)?;
        }
        for subtask in snapshot.subtasks {
            store.insert_subtask(subtask)?;
        }
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| ScanflowError::Other(anyhow!("task store lock poisoned")))
    }
}

impl TaskStore for InMemoryTaskStore {
    fn insert_task(&self, task: ScanTask) -> Result<()> {
        let mut tables = self.lock()?;
        if tables.tasks.contains_key(&task.id) {
            return Err(ScanflowError::DuplicateRecord(task.id));
        }
        trace!(task_id = %task.id, status = %task.status, "task inserted");
        tables.tasks.insert(task.id.clone(), task);
        Ok(())
    }

    fn insert_subtask(&self, subtask: SubScanTask) -> Result<()> {
        let mut tables = self.lock()?;
        if tables.subtasks.contains_key(&subtask.id) {
            return Err(ScanflowError::DuplicateRecord(subtask.id));
        }
        trace!(subtask_id = %subtask.id, status = %subtask.status, "sub-task inserted");
        tables.subtasks.insert(subtask.id.clone(), subtask);
        Ok(())
    }

    fn get_task(&self, id: &str) -> Result<ScanTask> {
        self.lock()?
            .tasks
            .get(id)
            .cloned()
            .ok_or_else(|| ScanflowError::TaskNotFound(id.to_string()))
    }

    fn get_subtask(&self, id: &str) -> Result<SubScanTask> {
        self.lock()?
            .subtasks
            .get(id)
            .cloned()
            .ok_or_else(|| ScanflowError::SubtaskNotFound(id.to_string()))
    }

    fn list_tasks(&self) -> Result<Vec<ScanTask>> {
        let tables = self.lock()?;
        let mut tasks: Vec<ScanTask> = tables.tasks.values().cloned().collect();
        tasks.sort_by(|a, b| a.created_date.cmp(&b.created_date).then_with(|| a.id.cmp(&b.id)));
        Ok(tasks)
    }

    fn list_subtasks(&self, parent: &str) -> Result<Vec<SubScanTask>> {
        let tables = self.lock()?;
        let mut subtasks: Vec<SubScanTask> = tables
            .subtasks
            .values()
            .filter(|s| s.parent_scan_task_id == parent)
            .cloned()
            .collect();
        subtasks.sort_by(|a, b| a.created_date.cmp(&b.created_date).then_with(|| a.id.cmp(&b.id)));
        Ok(subtasks)
    }

    fn find_subtasks(&self, query: &SubtaskQuery, limit: usize) -> Result<Vec<SubScanTask>> {
        let tables = self.lock()?;
        let ids = tables.matching_subtasks(query, &HashSet::new(), limit);
        Ok(ids
            .iter()
            .filter_map(|id| tables.subtasks.get(id).cloned())
            .collect())
    }

    fn update_task(&self, id: &str, update: &mut TaskUpdate<'_>) -> Result<ScanTask> {
        let mut tables = self.lock()?;
        let stored = tables
            .tasks
            .get_mut(id)
            .ok_or_else(|| ScanflowError::TaskNotFound(id.to_string()))?;
        let mut copy = stored.clone();
        update(&mut copy)?;
        *stored = copy.clone();
        Ok(copy)
    }

    fn update_subtask(&self, id: &str, update: &mut SubtaskUpdate<'_>) -> Result<SubScanTask> {
        self.lock()?.apply_subtask(id, update)
    }

    fn claim_task(
        &self,
        query: &TaskQuery,
        update: &mut TaskUpdate<'_>,
    ) -> Result<Option<ScanTask>> {
        let mut tables = self.lock()?;
        let candidate = tables
            .tasks
            .values()
            .filter(|t| query.matches(t))
            .min_by(|a, b| a.created_date.cmp(&b.created_date).then_with(|| a.id.cmp(&b.id)))
            .map(|t| t.id.clone());

        let Some(id) = candidate else {
            return Ok(None);
        };
        let Some(stored) = tables.tasks.get_mut(&id) else {
            return Ok(None);
        };
        let mut copy = stored.clone();
        update(&mut copy)?;
        *stored = copy.clone();
        debug!(task_id = %id, status = %copy.status, "task claimed");
        Ok(Some(copy))
    }

    fn claim_subtasks(
        &self,
        query: &SubtaskQuery,
        page_size: usize,
        update: &mut SubtaskUpdate<'_>,
    ) -> Result<Vec<ClaimOutcome>> {
        let page_size = page_size.max(1);
        let mut seen = HashSet::new();
        let mut outcomes = Vec::new();

        loop {
            let page = self.lock()?.matching_subtasks(query, &seen, page_size);
            if page.is_empty() {
                break;
            }
            trace!(candidates = page.len(), ?query, "claiming sub-task page");

            for id in page {
                seen.insert(id.clone());
                // Re-check under the lock; another caller may have moved it.
                let mut tables = self.lock()?;
                let still_matches = tables
                    .subtasks
                    .get(&id)
                    .is_some_and(|s| query.matches(s));
                if !still_matches {
                    continue;
                }
                match tables.apply_subtask(&id, update) {
                    Ok(subtask) => outcomes.push(ClaimOutcome::Applied(subtask)),
                    Err(error) => outcomes.push(ClaimOutcome::Failed { id, error }),
                }
            }
        }
        Ok(outcomes)
    }

    fn claim_first_subtask(
        &self,
        query: &SubtaskQuery,
        update: &mut SubtaskUpdate<'_>,
    ) -> Result<Option<SubScanTask>> {
        let mut tables = self.lock()?;
        let Some(id) = tables
            .matching_subtasks(query, &HashSet::new(), 1)
            .into_iter()
            .next()
        else {
            return Ok(None);
        };
        tables.apply_subtask(&id, update).map(Some)
    }

    fn claim_subtask(
        &self,
        id: &str,
        query: &SubtaskQuery,
        update: &mut SubtaskUpdate<'_>,
    ) -> Result<Option<SubScanTask>> {
        let mut tables = self.lock()?;
        let matches = tables.subtasks.get(id).is_some_and(|s| query.matches(s));
        if !matches {
            return Ok(None);
        }
        tables.apply_subtask(id, update).map(Some)
    }

    fn heartbeat(&self, id: &str, now: DateTime<Utc>) -> Result<bool> {
        let mut tables = self.lock()?;
        let subtask = tables
            .subtasks
            .get_mut(id)
            .ok_or_else(|| ScanflowError::SubtaskNotFound(id.to_string()))?;
        if !subtask.status.is_running() {
            return Ok(false);
        }
        subtask.heartbeat_date_time = Some(now);
        Ok(true)
    }

    fn snapshot(&self) -> Result<StoreSnapshot> {
        let tables = self.lock()?;
        Ok(StoreSnapshot {
            tasks: tables.tasks.values().cloned().collect(),
            subtasks: tables.subtasks.values().cloned().collect(),
        })
    }
}
