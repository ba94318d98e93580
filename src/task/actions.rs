// src/task/actions.rs

//! Side effects bound to scan-task transitions.
//!
//! Each action only touches the [`TaskContext`] it is handed; the caller
//! commits the mutated record together with the new status.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::errors::Result;
use crate::model::ScanTask;
use crate::notify::{Notification, Notifier};
use crate::statemachine::{Action, ActionCatalog, Event, TransitResult};
use crate::task::{ScanTaskEvent, ScanTaskMachine, ScanTaskStatus};

/// Payload of every scan-task event.
#[derive(Debug, Clone)]
pub struct TaskContext {
    /// Copy of the record being transitioned.
    pub task: ScanTask,
    pub now: DateTime<Utc>,
    /// Sub-task count reported with `FINISH_SUBMIT`.
    pub submitted: Option<u64>,
    pub reason: Option<String>,
}

impl TaskContext {
    pub fn new(task: ScanTask, now: DateTime<Utc>) -> Self {
        Self {
            task,
            now,
            submitted: None,
            reason: None,
        }
    }

    pub fn with_submitted(mut self, submitted: u64) -> Self {
        self.submitted = Some(submitted);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Send `event` and return the record with the new status committed.
    ///
    /// The returned record is only meaningful on `Ok`; on error the caller
    /// keeps its original copy.
    pub fn send(
        self,
        machine: &ScanTaskMachine,
        event: ScanTaskEvent,
    ) -> Result<(TransitResult<ScanTaskStatus>, ScanTask)> {
        let source = self.task.status;
        let now = self.now;
        let mut event = Event::new(event, self);
        let result = machine.send_event(source, &mut event)?;

        let mut task = event.into_context().task;
        task.status = result.target;
        task.last_modified_date = now;
        Ok((result, task))
    }
}

type Status = ScanTaskStatus;
type Ev = ScanTaskEvent;

/// PENDING -CREATE-> PENDING.
#[derive(Debug, Default)]
pub struct CreateTaskAction;

impl Action<Status, Ev, TaskContext> for CreateTaskAction {
    fn name(&self) -> &'static str {
        "create_task"
    }

    fn support(&self, _source: Status, _target: Status, event: Ev) -> bool {
        event == Ev::Create
    }

    fn execute(
        &self,
        _source: Status,
        _target: Status,
        ctx: &mut TaskContext,
    ) -> anyhow::Result<()> {
        ctx.task.created_date = ctx.now;
        Ok(())
    }
}

/// PENDING -SUBMIT-> SCANNING_SUBMITTING.
#[derive(Debug, Default)]
pub struct SubmitTaskAction;

impl Action<Status, Ev, TaskContext> for SubmitTaskAction {
    fn name(&self) -> &'static str {
        "submit_task"
    }

    fn support(&self, _source: Status, target: Status, event: Ev) -> bool {
        event == Ev::Submit && target == Status::ScanningSubmitting
    }

    fn execute(
        &self,
        _source: Status,
        _target: Status,
        ctx: &mut TaskContext,
    ) -> anyhow::Result<()> {
        ctx.task.start_date_time = Some(ctx.now);
        Ok(())
    }
}

/// SCANNING_SUBMITTING -FINISH_SUBMIT-> SCANNING_SUBMITTED.
#[derive(Debug, Default)]
pub struct FinishSubmitAction;

impl Action<Status, Ev, TaskContext> for FinishSubmitAction {
    fn name(&self) -> &'static str {
        "finish_submit"
    }

    fn support(&self, _source: Status, _target: Status, event: Ev) -> bool {
        event == Ev::FinishSubmit
    }

    fn execute(
        &self,
        _source: Status,
        _target: Status,
        ctx: &mut TaskContext,
    ) -> anyhow::Result<()> {
        if let Some(submitted) = ctx.submitted {
            ctx.task.total = submitted;
        }
        Ok(())
    }
}

/// {PENDING, SCANNING_SUBMITTING} -RESET-> PENDING.
#[derive(Debug)]
pub struct ResetTaskAction {
    notifier: Arc<dyn Notifier>,
}

impl ResetTaskAction {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }
}

impl Action<Status, Ev, TaskContext> for ResetTaskAction {
    fn name(&self) -> &'static str {
        "reset_task"
    }

    fn support(&self, _source: Status, target: Status, event: Ev) -> bool {
        event == Ev::Reset && target == Status::Pending
    }

    fn execute(
        &self,
        _source: Status,
        _target: Status,
        ctx: &mut TaskContext,
    ) -> anyhow::Result<()> {
        let task = &mut ctx.task;
        task.start_date_time = None;
        task.total = 0;
        task.scanned = 0;
        task.failed = 0;

        self.notifier.notify(Notification::TaskReset {
            task_id: task.id.clone(),
        });
        Ok(())
    }
}

/// SCANNING_SUBMITTED -FINISH-> FINISHED.
#[derive(Debug, Default)]
pub struct FinishTaskAction;

impl Action<Status, Ev, TaskContext> for FinishTaskAction {
    fn name(&self) -> &'static str {
        "finish_task"
    }

    fn support(&self, _source: Status, _target: Status, event: Ev) -> bool {
        event == Ev::Finish
    }

    fn execute(
        &self,
        _source: Status,
        _target: Status,
        ctx: &mut TaskContext,
    ) -> anyhow::Result<()> {
        ctx.task.finished_date_time = Some(ctx.now);
        Ok(())
    }
}

/// Any active state -STOP-> STOPPING.
#[derive(Debug, Default)]
pub struct StopTaskAction;

impl Action<Status, Ev, TaskContext> for StopTaskAction {
    fn name(&self) -> &'static str {
        "stop_task"
    }

    fn support(&self, _source: Status, target: Status, event: Ev) -> bool {
        event == Ev::Stop && target == Status::Stopping
    }

    fn execute(
        &self,
        _source: Status,
        _target: Status,
        ctx: &mut TaskContext,
    ) -> anyhow::Result<()> {
        ctx.task.stop_reason = ctx.reason.clone();
        Ok(())
    }
}

/// STOPPING -FINISH_STOP-> STOPPED.
#[derive(Debug, Default)]
pub struct FinishStopAction;

impl Action<Status, Ev, TaskContext> for FinishStopAction {
    fn name(&self) -> &'static str {
        "finish_stop"
    }

    fn support(&self, source: Status, _target: Status, event: Ev) -> bool {
        source == Status::Stopping && event == Ev::FinishStop
    }

    fn execute(
        &self,
        _source: Status,
        _target: Status,
        ctx: &mut TaskContext,
    ) -> anyhow::Result<()> {
        ctx.task.finished_date_time = Some(ctx.now);
        Ok(())
    }
}

/// Every scan-task action in priority order.
pub fn task_action_catalog(
    notifier: Arc<dyn Notifier>,
) -> ActionCatalog<ScanTaskStatus, ScanTaskEvent, TaskContext> {
    ActionCatalog::new()
        .with(CreateTaskAction)
        .with(SubmitTaskAction)
        .with(FinishSubmitAction)
        .with(ResetTaskAction::new(notifier))
        .with(FinishTaskAction)
        .with(StopTaskAction)
        .with(FinishStopAction)
}
