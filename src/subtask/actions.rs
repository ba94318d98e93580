// src/subtask/actions.rs

//! Side effects bound to sub-task transitions.

use std::sync::Arc;

use anyhow::anyhow;
use chrono::{DateTime, Utc};

use crate::clock::instant_after;
use crate::errors::Result;
use crate::model::{ScannerRegistry, SubScanTask, SubtaskRuntime};
use crate::notify::{Notification, Notifier};
use crate::statemachine::{Action, ActionCatalog, Event, TransitResult};
use crate::subtask::{SubScanTaskStatus, SubtaskEvent, SubtaskMachine};

/// Payload of every sub-task event.
#[derive(Debug, Clone)]
pub struct SubtaskContext {
    /// Copy of the record being transitioned.
    pub subtask: SubScanTask,
    pub now: DateTime<Utc>,
    /// Why the sub-task is blocked or finished.
    pub reason: Option<String>,
    /// Rebuilt runtime, required by `RETRY`.
    pub runtime: Option<SubtaskRuntime>,
}

impl SubtaskContext {
    pub fn new(subtask: SubScanTask, now: DateTime<Utc>) -> Self {
        Self {
            subtask,
            now,
            reason: None,
            runtime: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_runtime(mut self, runtime: SubtaskRuntime) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Send `event` and return the record with the new status committed.
    pub fn send(
        self,
        machine: &SubtaskMachine,
        event: SubtaskEvent,
    ) -> Result<(TransitResult<SubScanTaskStatus>, SubScanTask)> {
        let source = self.subtask.status;
        let now = self.now;
        let mut event = Event::new(event, self);
        let result = machine.send_event(source, &mut event)?;

        let mut subtask = event.into_context().subtask;
        subtask.status = result.target;
        subtask.last_modified_date = now;
        Ok((result, subtask))
    }
}

type Status = SubScanTaskStatus;
type Ev = SubtaskEvent;

/// NEVER_SCANNED -CREATE-> CREATED.
#[derive(Debug, Default)]
pub struct CreateSubtaskAction;

impl Action<Status, Ev, SubtaskContext> for CreateSubtaskAction {
    fn name(&self) -> &'static str {
        "create_subtask"
    }

    fn support(&self, _source: Status, target: Status, event: Ev) -> bool {
        event == Ev::Create && target == Status::Created
    }

    fn execute(
        &self,
        _source: Status,
        _target: Status,
        ctx: &mut SubtaskContext,
    ) -> anyhow::Result<()> {
        ctx.subtask.reason = None;
        Ok(())
    }
}

/// NEVER_SCANNED -BLOCK-> BLOCKED.
#[derive(Debug, Default)]
pub struct BlockSubtaskAction;

impl Action<Status, Ev, SubtaskContext> for BlockSubtaskAction {
    fn name(&self) -> &'static str {
        "block_subtask"
    }

    fn support(&self, _source: Status, _target: Status, event: Ev) -> bool {
        event == Ev::Block
    }

    fn execute(
        &self,
        _source: Status,
        _target: Status,
        ctx: &mut SubtaskContext,
    ) -> anyhow::Result<()> {
        ctx.subtask.reason = ctx.reason.clone();
        Ok(())
    }
}

/// BLOCKED -NOTIFY-> CREATED.
#[derive(Debug, Default)]
pub struct NotifySubtaskAction;

impl Action<Status, Ev, SubtaskContext> for NotifySubtaskAction {
    fn name(&self) -> &'static str {
        "notify_subtask"
    }

    fn support(&self, source: Status, _target: Status, event: Ev) -> bool {
        source == Status::Blocked && event == Ev::Notify
    }

    fn execute(
        &self,
        _source: Status,
        _target: Status,
        ctx: &mut SubtaskContext,
    ) -> anyhow::Result<()> {
        ctx.subtask.reason = None;
        Ok(())
    }
}

/// {CREATED, EXECUTING, PULLED} -PULL-> PULLED.
///
/// Opens a new run window sized by the scanner's budget.
#[derive(Debug)]
pub struct PullSubtaskAction {
    scanners: Arc<ScannerRegistry>,
}

impl PullSubtaskAction {
    pub fn new(scanners: Arc<ScannerRegistry>) -> Self {
        Self { scanners }
    }
}

impl Action<Status, Ev, SubtaskContext> for PullSubtaskAction {
    fn name(&self) -> &'static str {
        "pull_subtask"
    }

    fn support(&self, _source: Status, target: Status, event: Ev) -> bool {
        event == Ev::Pull && target == Status::Pulled
    }

    fn execute(
        &self,
        _source: Status,
        _target: Status,
        ctx: &mut SubtaskContext,
    ) -> anyhow::Result<()> {
        let budget = self.scanners.max_scan_duration(&ctx.subtask.scanner);
        let subtask = &mut ctx.subtask;
        subtask.executed_times = subtask.executed_times.saturating_add(1);
        subtask.heartbeat_date_time = Some(ctx.now);
        subtask.timeout_date_time = Some(instant_after(ctx.now, budget));
        Ok(())
    }
}

/// PULLED -EXECUTE-> EXECUTING.
#[derive(Debug, Default)]
pub struct ExecuteSubtaskAction;

impl Action<Status, Ev, SubtaskContext> for ExecuteSubtaskAction {
    fn name(&self) -> &'static str {
        "execute_subtask"
    }

    fn support(&self, _source: Status, _target: Status, event: Ev) -> bool {
        event == Ev::Execute
    }

    fn execute(
        &self,
        _source: Status,
        _target: Status,
        ctx: &mut SubtaskContext,
    ) -> anyhow::Result<()> {
        ctx.subtask.start_date_time = Some(ctx.now);
        ctx.subtask.heartbeat_date_time = Some(ctx.now);
        Ok(())
    }
}

/// {PULLED, EXECUTING} -RETRY-> CREATED.
#[derive(Debug)]
pub struct RetrySubtaskAction {
    notifier: Arc<dyn Notifier>,
}

impl RetrySubtaskAction {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }
}

impl Action<Status, Ev, SubtaskContext> for RetrySubtaskAction {
    fn name(&self) -> &'static str {
        "retry_subtask"
    }

    fn support(&self, _source: Status, target: Status, event: Ev) -> bool {
        event == Ev::Retry && target == Status::Created
    }

    fn execute(
        &self,
        _source: Status,
        _target: Status,
        ctx: &mut SubtaskContext,
    ) -> anyhow::Result<()> {
        let runtime = ctx
            .runtime
            .clone()
            .ok_or_else(|| anyhow!("RETRY of sub-task {} carries no runtime", ctx.subtask.id))?;

        let subtask = &mut ctx.subtask;
        subtask.retry_times = subtask.retry_times.saturating_add(1);
        subtask.clear_run_window();

        self.notifier
            .notify(Notification::SubtaskRedispatch { runtime });
        Ok(())
    }
}

/// Any started state into a terminal one.
#[derive(Debug)]
pub struct FinishSubtaskAction {
    notifier: Arc<dyn Notifier>,
}

impl FinishSubtaskAction {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }
}

impl Action<Status, Ev, SubtaskContext> for FinishSubtaskAction {
    fn name(&self) -> &'static str {
        "finish_subtask"
    }

    // NEVER_SCANNED -SUCCESS-> SUCCESS reuses an earlier result and stays silent.
    fn support(&self, source: Status, target: Status, _event: Ev) -> bool {
        source != Status::NeverScanned && target.is_terminal()
    }

    fn execute(
        &self,
        _source: Status,
        target: Status,
        ctx: &mut SubtaskContext,
    ) -> anyhow::Result<()> {
        let subtask = &mut ctx.subtask;
        subtask.finished_date_time = Some(ctx.now);
        subtask.reason = ctx.reason.clone();
        subtask.clear_run_window();

        self.notifier.notify(Notification::SubtaskFinished {
            subtask_id: subtask.id.clone(),
            parent_scan_task_id: subtask.parent_scan_task_id.clone(),
            status: target,
        });
        Ok(())
    }
}

/// Every sub-task action in priority order.
pub fn subtask_action_catalog(
    notifier: Arc<dyn Notifier>,
    scanners: Arc<ScannerRegistry>,
) -> ActionCatalog<SubScanTaskStatus, SubtaskEvent, SubtaskContext> {
    ActionCatalog::new()
        .with(CreateSubtaskAction)
        .with(BlockSubtaskAction)
        .with(NotifySubtaskAction)
        .with(PullSubtaskAction::new(scanners))
        .with(ExecuteSubtaskAction)
        .with(RetrySubtaskAction::new(notifier.clone()))
        .with(FinishSubtaskAction::new(notifier))
}
