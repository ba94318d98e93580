// tests/subtask_graph.rs

mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::Utc;
use scanflow::model::{ScanTask, Scanner, ScannerRegistry, SubScanTask};
use scanflow::notify::{NoopNotifier, Notification};
use scanflow::statemachine::{ActionCatalog, FnAction};
use scanflow::subtask::{
    SubScanTaskStatus as S, SubtaskContext, SubtaskEvent as E, SubtaskMachine,
    build_subtask_machine, subtask_machine,
};
use scanflow_test_utils::RecordingNotifier;

fn expected_table() -> HashMap<(S, E), S> {
    HashMap::from([
        ((S::NeverScanned, E::Create), S::Created),
        ((S::NeverScanned, E::Block), S::Blocked),
        ((S::Blocked, E::Notify), S::Created),
        ((S::Created, E::Failed), S::Failed),
        ((S::Created, E::Pull), S::Pulled),
        ((S::Executing, E::Pull), S::Pulled),
        ((S::Pulled, E::Pull), S::Pulled),
        ((S::Pulled, E::Execute), S::Executing),
        ((S::Pulled, E::Retry), S::Created),
        ((S::Pulled, E::Failed), S::Failed),
        ((S::Pulled, E::Timeout), S::Timeout),
        ((S::Blocked, E::BlockTimeout), S::BlockTimeout),
        ((S::Executing, E::Timeout), S::Timeout),
        ((S::Executing, E::Failed), S::Failed),
        ((S::Executing, E::Success), S::Success),
        ((S::Executing, E::Retry), S::Created),
        ((S::NeverScanned, E::Success), S::Success),
        ((S::Blocked, E::Stop), S::Stopped),
        ((S::Created, E::Stop), S::Stopped),
        ((S::Pulled, E::Stop), S::Stopped),
        ((S::Executing, E::Stop), S::Stopped),
    ])
}

fn registry() -> Arc<ScannerRegistry> {
    let mut registry = ScannerRegistry::new(Duration::from_secs(1200));
    registry.register(Scanner {
        name: "trivy".to_string(),
        kind: "trivy".to_string(),
        version: Some("0.50".to_string()),
        max_scan_duration: Duration::from_secs(600),
    });
    Arc::new(registry)
}

fn machine() -> SubtaskMachine {
    subtask_machine(Arc::new(NoopNotifier), registry()).unwrap()
}

fn subtask_in(status: S) -> SubScanTask {
    let now = Utc::now();
    let parent = ScanTask::new("nightly", "trivy", "admin", now);
    let mut sub = SubScanTask::new(&parent, "proj", "/a.jar", now);
    sub.status = status;
    sub
}

/// Context that satisfies every action, including `RETRY`.
fn context(sub: SubScanTask) -> SubtaskContext {
    let runtime = registry().runtime_for(&sub).unwrap();
    SubtaskContext::new(sub, Utc::now()).with_runtime(runtime)
}

#[test]
fn every_pair_is_legal_exactly_when_listed() {
    common::init_tracing();
    let m = machine();
    let table = expected_table();

    for state in S::ALL {
        for event in E::ALL {
            let result = context(subtask_in(state)).send(&m, event);
            match table.get(&(state, event)) {
                Some(target) => {
                    let (transit, _) = result
                        .unwrap_or_else(|e| panic!("{state} --{event}--> should be legal: {e}"));
                    assert_eq!(transit.target, *target, "{state} --{event}-->");
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
fn terminal_states_have_no_outgoing_rows() {
    let m = machine();
    for state in S::ALL {
        assert_eq!(m.is_terminal(state), state.is_terminal(), "{state}");
        if state.is_terminal() {
            assert!(m.events_from(state).is_empty());
        }
    }
}

#[test]
fn pull_on_pulled_is_an_idempotent_self_loop() {
    let m = machine();
    let mut sub = subtask_in(S::Pulled);
    for round in 1..=5 {
        let (transit, next) = context(sub).send(&m, E::Pull).unwrap();
        assert!(transit.is_self_loop());
        assert_eq!(next.status, S::Pulled);
        assert_eq!(next.executed_times, round);
        sub = next;
    }
}

#[test]
fn batch_stop_and_stop_after_success() {
    let notifier = RecordingNotifier::new();
    let m = subtask_machine(Arc::new(notifier.clone()), registry()).unwrap();

    for state in [S::Blocked, S::Created, S::Pulled, S::Executing] {
        let (_, sub) = context(subtask_in(state))
            .with_reason("stopped")
            .send(&m, E::Stop)
            .unwrap();
        assert_eq!(sub.status, S::Stopped);
        assert_eq!(sub.reason.as_deref(), Some("stopped"));
    }
    assert_eq!(notifier.kinds(), vec!["subtask_finished"; 4]);

    let err = context(subtask_in(S::Success)).send(&m, E::Stop).unwrap_err();
    assert!(err.is_illegal_transition());
}

#[test]
fn retry_attaches_runtime_and_notifies_redispatch() {
    let notifier = RecordingNotifier::new();
    let m = subtask_machine(Arc::new(notifier.clone()), registry()).unwrap();

    let mut sub = subtask_in(S::Executing);
    sub.heartbeat_date_time = Some(Utc::now());
    sub.timeout_date_time = Some(Utc::now());
    let (transit, sub) = context(sub).send(&m, E::Retry).unwrap();

    assert_eq!(transit.action, Some("retry_subtask"));
    assert_eq!(sub.status, S::Created);
    assert_eq!(sub.retry_times, 1);
    assert!(sub.heartbeat_date_time.is_none() && sub.timeout_date_time.is_none());
    match notifier.notifications().as_slice() {
        [Notification::SubtaskRedispatch { runtime }] => {
            assert_eq!(runtime.subtask_id, sub.id);
            assert_eq!(runtime.scanner.name, "trivy");
        }
        other => panic!("unexpected notifications: {other:?}"),
    }
}

#[test]
fn exactly_one_of_many_candidate_actions_runs() {
    let hits: Vec<Arc<AtomicUsize>> = (0..3).map(|_| Arc::new(AtomicUsize::new(0))).collect();
    let counting = |name: &'static str, event: E, hits: Arc<AtomicUsize>| {
        FnAction::new(
            name,
            move |_: S, _: S, e: E| e == event,
            move |_, _, _: &mut SubtaskContext| {
                hits.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
        )
    };
    let catalog = ActionCatalog::new()
        .with(counting("on-block", E::Block, hits[0].clone()))
        .with(counting("on-create", E::Create, hits[1].clone()))
        .with(counting("also-on-create", E::Create, hits[2].clone()));
    let m = build_subtask_machine(catalog).unwrap();

    let (transit, _) = context(subtask_in(S::NeverScanned)).send(&m, E::Create).unwrap();
    assert_eq!(transit.action, Some("on-create"));
    let counts: Vec<usize> = hits.iter().map(|h| h.load(Ordering::SeqCst)).collect();
    assert_eq!(counts, vec![0, 1, 0]);

    // No candidate matches: the state still changes.
    let (transit, sub) = context(subtask_in(S::Blocked)).send(&m, E::Notify).unwrap();
    assert_eq!(transit.action, None);
    assert_eq!(sub.status, S::Created);
}
