// src/service.rs

//! In-process entry points for the API layer and scanner workers.
//!
//! Every method is one unit of work on the store: the record is read, the
//! event is sent through the matching state machine, and the result is
//! written back inside the same store call.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::{ConfigFile, SchedulerConfig};
use crate::errors::{Result, ScanflowError};
use crate::model::{ScanTask, ScannerRegistry, SubScanTask};
use crate::notify::Notifier;
use crate::store::{ClaimOutcome, SubtaskQuery, TaskStore};
use crate::subtask::{
    SubScanTaskStatus, SubtaskContext, SubtaskEvent, SubtaskMachine, finish_event_of,
    subtask_machine,
};
use crate::task::{ScanTaskEvent, ScanTaskMachine, ScanTaskStatus, TaskContext, scan_task_machine};

/// Both state machines, built once at startup.
#[derive(Debug, Clone)]
pub struct Machines {
    pub task: Arc<ScanTaskMachine>,
    pub subtask: Arc<SubtaskMachine>,
}

impl Machines {
    pub fn new(notifier: Arc<dyn Notifier>, scanners: Arc<ScannerRegistry>) -> Result<Self> {
        Ok(Self {
            task: Arc::new(scan_task_machine(notifier.clone())?),
            subtask: Arc::new(subtask_machine(notifier, scanners)?),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ScanService {
    store: Arc<dyn TaskStore>,
    machines: Machines,
    scanners: Arc<ScannerRegistry>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
}

impl ScanService {
    pub fn new(
        store: Arc<dyn TaskStore>,
        machines: Machines,
        scanners: Arc<ScannerRegistry>,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            machines,
            scanners,
            clock,
            config,
        }
    }

    /// Wire a service from validated configuration.
    pub fn from_config(
        cfg: &ConfigFile,
        store: Arc<dyn TaskStore>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let scanners = Arc::new(ScannerRegistry::from_config(cfg));
        let machines = Machines::new(notifier, scanners.clone())?;
        Ok(Self::new(
            store,
            machines,
            scanners,
            clock,
            cfg.scheduler.clone(),
        ))
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    pub fn machines(&self) -> &Machines {
        &self.machines
    }

    pub fn scanners(&self) -> &ScannerRegistry {
        &self.scanners
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // ---------------------------------------------------------------------
    // Scan tasks
    // ---------------------------------------------------------------------

    /// Create a scan task in `PENDING`.
    pub fn create_task(
        &self,
        name: &str,
        scanner: &str,
        created_by: &str,
        project_id: Option<String>,
    ) -> Result<ScanTask> {
        self.scanners.get(scanner)?;
        let now = self.now();
        let mut task = ScanTask::new(name, scanner, created_by, now);
        task.project_id = project_id;

        let (_, task) = TaskContext::new(task, now).send(&self.machines.task, ScanTaskEvent::Create)?;
        self.store.insert_task(task.clone())?;
        info!(task_id = %task.id, scanner, "scan task created");
        Ok(task)
    }

    pub fn submit_task(&self, id: &str) -> Result<ScanTask> {
        self.transit_task(id, ScanTaskEvent::Submit, |ctx| ctx)
    }

    /// All sub-tasks are queued; finishes the task straight away when every
    /// one of them already completed.
    pub fn finish_submit(&self, id: &str, submitted: u64) -> Result<ScanTask> {
        let now = self.now();
        let machine = &self.machines.task;
        let task = self.store.update_task(id, &mut |task: &mut ScanTask| {
            let (_, mut updated) = TaskContext::new(task.clone(), now)
                .with_submitted(submitted)
                .send(machine, ScanTaskEvent::FinishSubmit)?;
            if updated.scanned >= updated.total {
                (_, updated) = TaskContext::new(updated, now).send(machine, ScanTaskEvent::Finish)?;
            }
            *task = updated;
            Ok(())
        })?;
        info!(task_id = %id, submitted, status = %task.status, "scan task submitted");
        Ok(task)
    }

    pub fn finish_task(&self, id: &str) -> Result<ScanTask> {
        self.transit_task(id, ScanTaskEvent::Finish, |ctx| ctx)
    }

    /// Stop a task and every sub-task that can still be stopped, then mark
    /// the task `STOPPED`.
    pub fn stop_task(&self, id: &str, reason: &str) -> Result<ScanTask> {
        self.transit_task(id, ScanTaskEvent::Stop, |ctx| ctx.with_reason(reason))?;

        for subtask in self.store.list_subtasks(id)? {
            if !self
                .machines
                .subtask
                .can_fire(subtask.status, SubtaskEvent::Stop)
            {
                continue;
            }
            match self.stop_subtask(&subtask.id, reason) {
                Ok(_) => {}
                Err(e) if e.is_illegal_transition() => {
                    debug!(subtask_id = %subtask.id, "sub-task finished before it could be stopped");
                }
                Err(e) => return Err(e),
            }
        }

        self.finish_stop(id)
    }

    pub fn finish_stop(&self, id: &str) -> Result<ScanTask> {
        self.transit_task(id, ScanTaskEvent::FinishStop, |ctx| ctx)
    }

    /// Send `RESET` to a task by hand.
    pub fn reset_task(&self, id: &str) -> Result<ScanTask> {
        self.transit_task(id, ScanTaskEvent::Reset, |ctx| ctx)
    }

    fn transit_task(
        &self,
        id: &str,
        event: ScanTaskEvent,
        prepare: impl Fn(TaskContext) -> TaskContext,
    ) -> Result<ScanTask> {
        let now = self.now();
        let machine = &self.machines.task;
        let mut source = None;
        let task = self.store.update_task(id, &mut |task: &mut ScanTask| {
            source = Some(task.status);
            let (_, updated) = prepare(TaskContext::new(task.clone(), now)).send(machine, event)?;
            *task = updated;
            Ok(())
        })?;
        info!(
            task_id = %id,
            event = %event,
            from = %source.map(|s| s.to_string()).unwrap_or_default(),
            to = %task.status,
            "scan task transitioned"
        );
        Ok(task)
    }

    // ---------------------------------------------------------------------
    // Sub-tasks
    // ---------------------------------------------------------------------

    /// Register a sub-task of `parent_id` in `NEVER_SCANNED`.
    pub fn add_subtask(
        &self,
        parent_id: &str,
        project_id: &str,
        full_path: &str,
        sha256: Option<String>,
    ) -> Result<SubScanTask> {
        let parent = self.store.get_task(parent_id)?;
        let mut subtask = SubScanTask::new(&parent, project_id, full_path, self.now());
        subtask.sha256 = sha256;
        self.store.insert_subtask(subtask.clone())?;
        debug!(subtask_id = %subtask.id, task_id = %parent_id, full_path, "sub-task added");
        Ok(subtask)
    }

    /// Queue a sub-task for workers.
    pub fn create_subtask(&self, id: &str) -> Result<SubScanTask> {
        self.transit_subtask(id, SubtaskEvent::Create, |ctx| ctx)
    }

    /// Hold a sub-task back until [`notify_project`](Self::notify_project).
    pub fn block_subtask(&self, id: &str, reason: &str) -> Result<SubScanTask> {
        self.transit_subtask(id, SubtaskEvent::Block, |ctx| ctx.with_reason(reason))
    }

    pub fn notify_subtask(&self, id: &str) -> Result<SubScanTask> {
        self.transit_subtask(id, SubtaskEvent::Notify, |ctx| ctx)
    }

    /// Release every blocked sub-task of a project.
    pub fn notify_project(&self, project_id: &str) -> Result<Vec<SubScanTask>> {
        let now = self.now();
        let machine = &self.machines.subtask;
        let query = SubtaskQuery::BlockedInProject {
            project_id: project_id.to_string(),
        };
        let outcomes = self.store.claim_subtasks(
            &query,
            self.config.page_size,
            &mut |subtask: &mut SubScanTask| {
                let (_, updated) =
                    SubtaskContext::new(subtask.clone(), now).send(machine, SubtaskEvent::Notify)?;
                *subtask = updated;
                Ok(())
            },
        )?;

        let mut released = Vec::new();
        for outcome in outcomes {
            match outcome {
                ClaimOutcome::Applied(subtask) => released.push(subtask),
                ClaimOutcome::Failed { id, error } => {
                    warn!(subtask_id = %id, error = %error, "failed to release blocked sub-task");
                }
            }
        }
        info!(project_id, released = released.len(), "blocked sub-tasks released");
        Ok(released)
    }

    /// Hand the next sub-task to a worker.
    ///
    /// Prefers `CREATED` sub-tasks, oldest first. Without one, a sub-task
    /// whose run timed out is pulled again, or finished as `TIMEOUT` once it
    /// used up `max_execute_times`. Losing the race for a candidate is retried
    /// up to `max_pull_retry` times.
    pub fn pull_subtask(&self) -> Result<Option<SubScanTask>> {
        let machine = &self.machines.subtask;
        let mut lost_races = 0;

        loop {
            let now = self.now();
            let pulled = self.store.claim_first_subtask(
                &SubtaskQuery::Ready,
                &mut |subtask: &mut SubScanTask| {
                    let (_, updated) =
                        SubtaskContext::new(subtask.clone(), now).send(machine, SubtaskEvent::Pull)?;
                    *subtask = updated;
                    Ok(())
                },
            )?;
            if let Some(subtask) = pulled {
                info!(subtask_id = %subtask.id, executed_times = subtask.executed_times, "sub-task pulled");
                return Ok(Some(subtask));
            }

            let query = self.execution_timeout_query(now);
            let Some(candidate) = self.store.find_subtasks(&query, 1)?.into_iter().next() else {
                return Ok(None);
            };

            let exhausted = candidate.executed_times >= self.config.max_execute_times;
            let (event, reason) = if exhausted {
                (
                    SubtaskEvent::Timeout,
                    Some(format!(
                        "sub-task timed out after {} executions",
                        candidate.executed_times
                    )),
                )
            } else {
                (SubtaskEvent::Pull, None)
            };

            let claimed = self.store.claim_subtask(
                &candidate.id,
                &query,
                &mut |subtask: &mut SubScanTask| {
                    let mut ctx = SubtaskContext::new(subtask.clone(), now);
                    ctx.reason = reason.clone();
                    let (_, updated) = ctx.send(machine, event)?;
                    *subtask = updated;
                    Ok(())
                },
            )?;

            match claimed {
                Some(subtask) if exhausted => {
                    warn!(
                        subtask_id = %subtask.id,
                        executed_times = subtask.executed_times,
                        "sub-task exceeded max execute times"
                    );
                    self.record_subtask_result(&subtask);
                }
                Some(subtask) => {
                    info!(
                        subtask_id = %subtask.id,
                        executed_times = subtask.executed_times,
                        "timed out sub-task pulled again"
                    );
                    return Ok(Some(subtask));
                }
                None => {
                    lost_races += 1;
                    debug!(subtask_id = %candidate.id, lost_races, "lost pull race");
                    if lost_races >= self.config.max_pull_retry {
                        warn!(lost_races, "giving up pull after repeated contention");
                        return Ok(None);
                    }
                }
            }
        }
    }

    pub fn execute_subtask(&self, id: &str) -> Result<SubScanTask> {
        self.transit_subtask(id, SubtaskEvent::Execute, |ctx| ctx)
    }

    /// Record a worker's final report, `target` being a terminal state.
    pub fn report_subtask(
        &self,
        id: &str,
        target: SubScanTaskStatus,
        reason: Option<&str>,
    ) -> Result<SubScanTask> {
        let event = finish_event_of(target)
            .ok_or_else(|| ScanflowError::NonTerminalTarget(target.to_string()))?;
        let subtask = self.transit_subtask(id, event, |ctx| match reason {
            Some(reason) => ctx.with_reason(reason),
            None => ctx,
        })?;
        self.record_subtask_result(&subtask);
        Ok(subtask)
    }

    pub fn heartbeat(&self, id: &str) -> Result<bool> {
        let alive = self.store.heartbeat(id, self.now())?;
        if !alive {
            debug!(subtask_id = %id, "heartbeat for a sub-task that is not running");
        }
        Ok(alive)
    }

    pub fn stop_subtask(&self, id: &str, reason: &str) -> Result<SubScanTask> {
        let subtask = self.transit_subtask(id, SubtaskEvent::Stop, |ctx| ctx.with_reason(reason))?;
        self.record_subtask_result(&subtask);
        Ok(subtask)
    }

    fn transit_subtask(
        &self,
        id: &str,
        event: SubtaskEvent,
        prepare: impl Fn(SubtaskContext) -> SubtaskContext,
    ) -> Result<SubScanTask> {
        let now = self.now();
        let machine = &self.machines.subtask;
        let mut source = None;
        let subtask = self.store.update_subtask(id, &mut |subtask: &mut SubScanTask| {
            source = Some(subtask.status);
            let (_, updated) =
                prepare(SubtaskContext::new(subtask.clone(), now)).send(machine, event)?;
            *subtask = updated;
            Ok(())
        })?;
        info!(
            subtask_id = %id,
            event = %event,
            from = %source.map(|s| s.to_string()).unwrap_or_default(),
            to = %subtask.status,
            "sub-task transitioned"
        );
        Ok(subtask)
    }

    /// Query matching sub-tasks whose current run timed out at `now`.
    pub(crate) fn execution_timeout_query(&self, now: DateTime<Utc>) -> SubtaskQuery {
        SubtaskQuery::ExecutionTimedOut {
            now,
            heartbeat_timeout: self.config.heartbeat_timeout,
            max_task_duration: self.config.max_task_duration,
        }
    }

    /// Count a finished sub-task against its parent and finish the parent
    /// once everything it submitted is done.
    ///
    /// Runs as its own unit of work after the sub-task write; failures are
    /// logged and never undo the sub-task transition.
    pub(crate) fn record_subtask_result(&self, subtask: &SubScanTask) {
        if !subtask.status.is_terminal() {
            return;
        }
        let now = self.now();
        let machine = &self.machines.task;
        let failed = subtask.status != SubScanTaskStatus::Success;

        let result = self
            .store
            .update_task(&subtask.parent_scan_task_id, &mut |task: &mut ScanTask| {
                task.scanned += 1;
                if failed {
                    task.failed += 1;
                }
                if task.status == ScanTaskStatus::ScanningSubmitted && task.scanned >= task.total {
                    let (_, updated) =
                        TaskContext::new(task.clone(), now).send(machine, ScanTaskEvent::Finish)?;
                    *task = updated;
                }
                Ok(())
            });

        match result {
            Ok(task) if task.status == ScanTaskStatus::Finished => {
                info!(task_id = %task.id, scanned = task.scanned, failed = task.failed, "scan task finished");
            }
            Ok(_) => {}
            Err(e) => {
                warn!(
                    subtask_id = %subtask.id,
                    task_id = %subtask.parent_scan_task_id,
                    error = %e,
                    "failed to record sub-task result on its parent"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Duration as Delta;

    use super::*;
    use crate::clock::ManualClock;
    use crate::model::Scanner;
    use crate::notify::NoopNotifier;
    use crate::store::InMemoryTaskStore;

    fn service(clock: ManualClock) -> ScanService {
        let mut registry = ScannerRegistry::new(Duration::from_secs(60));
        registry.register(Scanner {
            name: "trivy".to_string(),
            kind: "trivy".to_string(),
            version: None,
            max_scan_duration: Duration::from_secs(60),
        });
        let scanners = Arc::new(registry);
        let machines = Machines::new(Arc::new(NoopNotifier), scanners.clone()).unwrap();
        ScanService::new(
            Arc::new(InMemoryTaskStore::new()),
            machines,
            scanners,
            Arc::new(clock),
            SchedulerConfig::default(),
        )
    }

    #[test]
    fn unknown_scanner_is_rejected_on_create() {
        let svc = service(ManualClock::default());
        let err = svc.create_task("t", "nope", "admin", None).unwrap_err();
        assert!(matches!(err, ScanflowError::ScannerNotFound(_)));
    }

    #[test]
    fn full_happy_path_finishes_parent() {
        let svc = service(ManualClock::default());
        let task = svc.create_task("t", "trivy", "admin", None).unwrap();
        svc.submit_task(&task.id).unwrap();
        let sub = svc.add_subtask(&task.id, "proj", "/a.jar", None).unwrap();
        svc.create_subtask(&sub.id).unwrap();
        let task = svc.finish_submit(&task.id, 1).unwrap();
        assert_eq!(task.status, ScanTaskStatus::ScanningSubmitted);

        let pulled = svc.pull_subtask().unwrap().unwrap();
        assert_eq!(pulled.id, sub.id);
        svc.execute_subtask(&sub.id).unwrap();
        let done = svc
            .report_subtask(&sub.id, SubScanTaskStatus::Success, None)
            .unwrap();
        assert_eq!(done.status, SubScanTaskStatus::Success);

        let task = svc.store().get_task(&task.id).unwrap();
        assert_eq!(task.status, ScanTaskStatus::Finished);
        assert_eq!((task.scanned, task.failed), (1, 0));
    }

    #[test]
    fn report_rejects_non_terminal_target() {
        let svc = service(ManualClock::default());
        let err = svc
            .report_subtask("x", SubScanTaskStatus::Pulled, None)
            .unwrap_err();
        assert!(matches!(err, ScanflowError::NonTerminalTarget(_)));
        assert_eq!(err.to_string(), "not a terminal sub-task state: PULLED");
    }

    #[test]
    fn exhausted_timed_out_sub_task_is_finished_on_pull() {
        let clock = ManualClock::default();
        let svc = service(clock.clone());
        let task = svc.create_task("t", "trivy", "admin", None).unwrap();
        let sub = svc.add_subtask(&task.id, "proj", "/a.jar", None).unwrap();
        svc.create_subtask(&sub.id).unwrap();

        for _ in 0..3 {
            svc.pull_subtask().unwrap().unwrap();
            clock.advance(Delta::seconds(61));
        }

        assert!(svc.pull_subtask().unwrap().is_none());
        let sub = svc.store().get_subtask(&sub.id).unwrap();
        assert_eq!(sub.status, SubScanTaskStatus::Timeout);
        assert_eq!(sub.executed_times, 3);
    }
}
