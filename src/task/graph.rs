// src/task/graph.rs

use std::sync::Arc;

use crate::errors::Result;
use crate::notify::Notifier;
use crate::statemachine::{ActionCatalog, StateMachine};
use crate::task::actions::{TaskContext, task_action_catalog};
use crate::task::{ScanTaskEvent, ScanTaskStatus};

pub type ScanTaskMachine = StateMachine<ScanTaskStatus, ScanTaskEvent, TaskContext>;

/// Register the scan-task transition table, sharing `catalog` between rows.
pub fn build_scan_task_machine(
    catalog: ActionCatalog<ScanTaskStatus, ScanTaskEvent, TaskContext>,
) -> Result<ScanTaskMachine> {
    use ScanTaskEvent as E;
    use ScanTaskStatus as S;

    let mut builder = StateMachine::builder("scan_task");
    builder
        .add_transition(S::Pending, S::Pending, E::Create, catalog.clone())?
        .add_transition(S::Pending, S::ScanningSubmitting, E::Submit, catalog.clone())?
        .add_transition(
            S::ScanningSubmitting,
            S::ScanningSubmitted,
            E::FinishSubmit,
            catalog.clone(),
        )?
        .add_transition(S::ScanningSubmitting, S::Pending, E::Reset, catalog.clone())?
        .add_transition(S::Pending, S::Pending, E::Reset, catalog.clone())?
        .add_transition(S::ScanningSubmitted, S::Finished, E::Finish, catalog.clone())?
        .add_batch_transition(
            [S::Pending, S::ScanningSubmitting, S::ScanningSubmitted],
            S::Stopping,
            E::Stop,
            catalog.clone(),
        )?
        .add_transition(S::Stopping, S::Stopped, E::FinishStop, catalog)?;
    Ok(builder.build())
}

/// Scan-task machine wired with the standard action catalog.
pub fn scan_task_machine(notifier: Arc<dyn Notifier>) -> Result<ScanTaskMachine> {
    build_scan_task_machine(task_action_catalog(notifier))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::model::ScanTask;
    use crate::notify::NoopNotifier;

    fn machine() -> ScanTaskMachine {
        scan_task_machine(Arc::new(NoopNotifier)).unwrap()
    }

    #[test]
    fn terminal_states_have_no_outgoing_rows() {
        let m = machine();
        for status in ScanTaskStatus::ALL {
            assert_eq!(m.is_terminal(status), status.is_terminal(), "{status}");
        }
    }

    #[test]
    fn every_state_is_reachable_from_pending() {
        let reachable = machine().reachable_from(ScanTaskStatus::Pending);
        assert_eq!(reachable.len(), ScanTaskStatus::ALL.len());
    }

    #[test]
    fn submit_records_start_time() {
        let now = Utc::now();
        let task = ScanTask::new("t", "trivy", "admin", now);
        let (result, task) = TaskContext::new(task, now)
            .send(&machine(), ScanTaskEvent::Submit)
            .unwrap();
        assert_eq!(result.action, Some("submit_task"));
        assert_eq!(task.status, ScanTaskStatus::ScanningSubmitting);
        assert_eq!(task.start_date_time, Some(now));
    }
}
