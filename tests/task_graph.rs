// tests/task_graph.rs

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use scanflow::model::ScanTask;
use scanflow::notify::NoopNotifier;
use scanflow::task::{ScanTaskEvent as E, ScanTaskMachine, ScanTaskStatus as S, TaskContext};
use scanflow_test_utils::RecordingNotifier;

fn expected_table() -> HashMap<(S, E), S> {
    HashMap::from([
        ((S::Pending, E::Create), S::Pending),
        ((S::Pending, E::Submit), S::ScanningSubmitting),
        ((S::ScanningSubmitting, E::FinishSubmit), S::ScanningSubmitted),
        ((S::ScanningSubmitting, E::Reset), S::Pending),
        ((S::Pending, E::Reset), S::Pending),
        ((S::ScanningSubmitted, E::Finish), S::Finished),
        ((S::Pending, E::Stop), S::Stopping),
        ((S::ScanningSubmitting, E::Stop), S::Stopping),
        ((S::ScanningSubmitted, E::Stop), S::Stopping),
        ((S::Stopping, E::FinishStop), S::Stopped),
    ])
}

fn machine() -> ScanTaskMachine {
    scanflow::task::scan_task_machine(Arc::new(NoopNotifier)).unwrap()
}

fn task_in(status: S) -> ScanTask {
    let mut task = ScanTask::new("nightly", "trivy", "admin", Utc::now());
    task.status = status;
    task
}

#[test]
fn every_pair_is_legal_exactly_when_listed() {
    common::init_tracing();
    let m = machine();
    let table = expected_table();

    for state in S::ALL {
        for event in E::ALL {
            let result = TaskContext::new(task_in(state), Utc::now()).send(&m, event);
            match table.get(&(state, event)) {
                Some(target) => {
                    let (transit, task) = result
                        .unwrap_or_else(|e| panic!("{state} --{event}--> should be legal: {e}"));
                    assert_eq!(transit.target, *target);
                    assert_eq!(task.status, *target);
                }
                None => {
                    let err = result.expect_err("pair should be illegal");
                    assert!(err.is_illegal_transition(), "{state} --{event}-->: {err}");
                }
            }
        }
    }
}

#[test]
fn reset_clears_progress_and_notifies() {
    let notifier = RecordingNotifier::new();
    let m = scanflow::task::scan_task_machine(Arc::new(notifier.clone())).unwrap();

    let mut task = task_in(S::ScanningSubmitting);
    task.start_date_time = Some(Utc::now());
    task.total = 4;
    task.scanned = 2;

    let (transit, task) = TaskContext::new(task, Utc::now()).send(&m, E::Reset).unwrap();
    assert_eq!(transit.action, Some("reset_task"));
    assert_eq!(task.status, S::Pending);
    assert_eq!((task.total, task.scanned, task.start_date_time), (0, 0, None));
    assert_eq!(notifier.kinds(), vec!["task_reset"]);
}

#[test]
fn stop_from_each_active_state_records_reason() {
    let m = machine();
    for state in [S::Pending, S::ScanningSubmitting, S::ScanningSubmitted] {
        let (transit, task) = TaskContext::new(task_in(state), Utc::now())
            .with_reason("cancelled by user")
            .send(&m, E::Stop)
            .unwrap();
        assert_eq!(transit.action, Some("stop_task"));
        assert_eq!(task.stop_reason.as_deref(), Some("cancelled by user"));
    }
}
