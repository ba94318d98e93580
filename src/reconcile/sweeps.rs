// src/reconcile/sweeps.rs

use std::fmt;
use std::ops::AddAssign;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::clock::instant_before;
use crate::config::format_duration;
use crate::errors::Result;
use crate::model::{ScanTask, SubScanTask};
use crate::service::ScanService;
use crate::store::{ClaimOutcome, SubtaskQuery, TaskQuery};
use crate::subtask::{SubtaskContext, SubtaskEvent};
use crate::task::{ScanTaskEvent, TaskContext};

/// The three reconciliation sweeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepKind {
    SubmitTimeout,
    BlockTimeout,
    ExecutionTimeout,
}

impl SweepKind {
    pub const ALL: [SweepKind; 3] = [
        SweepKind::SubmitTimeout,
        SweepKind::BlockTimeout,
        SweepKind::ExecutionTimeout,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SweepKind::SubmitTimeout => "submit_timeout",
            SweepKind::BlockTimeout => "block_timeout",
            SweepKind::ExecutionTimeout => "execution_timeout",
        }
    }
}

impl fmt::Display for SweepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What one run of a sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Records the claim query matched.
    pub claimed: usize,
    pub transitioned: usize,
    pub failed: usize,
}

impl SweepReport {
    /// Nothing was claimed and nothing went wrong.
    pub fn is_empty(&self) -> bool {
        self.claimed == 0 && self.failed == 0
    }
}

impl AddAssign for SweepReport {
    fn add_assign(&mut self, other: Self) {
        self.claimed += other.claimed;
        self.transitioned += other.transitioned;
        self.failed += other.failed;
    }
}

/// Turns elapsed-time conditions in the store into state-machine events.
///
/// Each sweep claims through the store, so several reconcilers may run
/// against the same store without processing a record twice.
#[derive(Debug, Clone)]
pub struct Reconciler {
    service: ScanService,
}

impl Reconciler {
    pub fn new(service: ScanService) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &ScanService {
        &self.service
    }

    pub fn run(&self, kind: SweepKind) -> SweepReport {
        match kind {
            SweepKind::SubmitTimeout => self.submit_timeout_sweep(),
            SweepKind::BlockTimeout => self.block_timeout_sweep(),
            SweepKind::ExecutionTimeout => self.execution_timeout_sweep(),
        }
    }

    /// Reset at most one task stuck in a submitting state.
    pub fn submit_timeout_sweep(&self) -> SweepReport {
        let svc = &self.service;
        let now = svc.now();
        let timeout = svc.config().submit_timeout;
        let query = TaskQuery::SubmitTimedOut {
            before: instant_before(now, timeout),
        };
        let machine = &svc.machines().task;

        let mut claimed_id = None;
        let result = svc.store().claim_task(&query, &mut |task: &mut ScanTask| {
            claimed_id = Some(task.id.clone());
            let (_, updated) =
                TaskContext::new(task.clone(), now).send(machine, ScanTaskEvent::Reset)?;
            *task = updated;
            Ok(())
        });

        match result {
            Ok(Some(task)) => {
                info!(
                    task_id = %task.id,
                    timeout = %format_duration(timeout),
                    "submit timed out; task reset to PENDING"
                );
                SweepReport {
                    claimed: 1,
                    transitioned: 1,
                    failed: 0,
                }
            }
            Ok(None) => SweepReport::default(),
            Err(e) => {
                warn!(
                    task_id = claimed_id.as_deref().unwrap_or("-"),
                    error = %e,
                    "submit-timeout sweep failed"
                );
                SweepReport {
                    claimed: usize::from(claimed_id.is_some()),
                    transitioned: 0,
                    failed: 1,
                }
            }
        }
    }

    /// Finish every sub-task blocked for longer than `block_timeout`.
    /// A zero timeout disables the sweep.
    pub fn block_timeout_sweep(&self) -> SweepReport {
        let svc = &self.service;
        let config = svc.config();
        if !config.block_timeout_enabled() {
            return SweepReport::default();
        }

        let now = svc.now();
        let timeout = config.block_timeout;
        let query = SubtaskQuery::BlockTimedOut {
            before: instant_before(now, timeout),
        };
        let machine = &svc.machines().subtask;

        let outcomes = svc.store().claim_subtasks(
            &query,
            config.page_size,
            &mut |subtask: &mut SubScanTask| {
                let reason = format!(
                    "blocked since {} and not released within {}",
                    subtask.created_date.to_rfc3339(),
                    format_duration(timeout)
                );
                let (_, updated) = SubtaskContext::new(subtask.clone(), now)
                    .with_reason(reason)
                    .send(machine, SubtaskEvent::BlockTimeout)?;
                *subtask = updated;
                Ok(())
            },
        );
        self.collect(SweepKind::BlockTimeout, outcomes)
    }

    /// Send every timed out run back to `CREATED`, or finish it as `TIMEOUT`
    /// once it used up `max_execute_times`.
    pub fn execution_timeout_sweep(&self) -> SweepReport {
        let svc = &self.service;
        let config = svc.config();
        let now = svc.now();
        let query = svc.execution_timeout_query(now);
        let machine = &svc.machines().subtask;
        let max_execute_times = config.max_execute_times;

        let outcomes = svc.store().claim_subtasks(
            &query,
            config.page_size,
            &mut |subtask: &mut SubScanTask| {
                let ctx = SubtaskContext::new(subtask.clone(), now);
                let (_, updated) = if subtask.executed_times >= max_execute_times {
                    ctx.with_reason(format!(
                        "timed out after {} executions",
                        subtask.executed_times
                    ))
                    .send(machine, SubtaskEvent::Timeout)?
                } else {
                    let runtime = svc.scanners().runtime_for(subtask)?;
                    ctx.with_runtime(runtime).send(machine, SubtaskEvent::Retry)?
                };
                *subtask = updated;
                Ok(())
            },
        );
        self.collect(SweepKind::ExecutionTimeout, outcomes)
    }

    fn collect(
        &self,
        kind: SweepKind,
        outcomes: Result<Vec<ClaimOutcome>>,
    ) -> SweepReport {
        let outcomes = match outcomes {
            Ok(outcomes) => outcomes,
            Err(e) => {
                warn!(sweep = %kind, error = %e, "sweep could not query the store");
                return SweepReport {
                    failed: 1,
                    ..SweepReport::default()
                };
            }
        };

        let mut report = SweepReport {
            claimed: outcomes.len(),
            ..SweepReport::default()
        };
        for outcome in outcomes {
            match outcome {
                ClaimOutcome::Applied(subtask) => {
                    report.transitioned += 1;
                    debug!(
                        sweep = %kind,
                        subtask_id = %subtask.id,
                        to = %subtask.status,
                        retry_times = subtask.retry_times,
                        "sub-task reconciled"
                    );
                    self.service.record_subtask_result(&subtask);
                }
                ClaimOutcome::Failed { id, error } => {
                    report.failed += 1;
                    warn!(sweep = %kind, subtask_id = %id, error = %error, "sub-task left untouched");
                }
            }
        }

        if !report.is_empty() {
            info!(
                sweep = %kind,
                claimed = report.claimed,
                transitioned = report.transitioned,
                failed = report.failed,
                "sweep finished"
            );
        }
        report
    }

    /// Run every sweep once, in order.
    pub fn run_all(&self) -> Vec<(SweepKind, SweepReport)> {
        SweepKind::ALL
            .into_iter()
            .map(|kind| (kind, self.run(kind)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_query_is_not_an_empty_report() {
        assert!(SweepReport::default().is_empty());

        let query_failed = SweepReport {
            failed: 1,
            ..SweepReport::default()
        };
        assert!(!query_failed.is_empty());

        let mut total = SweepReport::default();
        total += query_failed;
        total += SweepReport {
            claimed: 2,
            transitioned: 2,
            failed: 0,
        };
        assert_eq!(
            total,
            SweepReport {
                claimed: 2,
                transitioned: 2,
                failed: 1
            }
        );
    }
}
