// tests/property_graphs.rs

use proptest::prelude::*;
use scanflow::model::{ScanTask, SubScanTask};
use scanflow::subtask::{SubScanTaskStatus, SubtaskContext, SubtaskEvent};
use scanflow::task::{ScanTaskEvent, ScanTaskStatus, TaskContext};
use scanflow_test_utils::{ConfigFileBuilder, Harness};

proptest! {
    // Every step either lands on the registered target or is rejected with
    // the record left as it was.
    #[test]
    fn task_walk_follows_the_table(
        events in proptest::collection::vec(0..ScanTaskEvent::ALL.len(), 1..40)
    ) {
        let h = Harness::new(&ConfigFileBuilder::new().build());
        let machine = h.service.machines().task.clone();
        let reachable = machine.reachable_from(ScanTaskStatus::Pending);
        let mut task = ScanTask::new("walk", "trivy", "prop", h.now());

        for idx in events {
            let event = ScanTaskEvent::ALL[idx];
            let before = task.clone();
            let expected = machine.target_of(before.status, event);

            let result = TaskContext::new(before.clone(), h.now())
                .with_reason("prop")
                .send(&machine, event);
            match (expected, result) {
                (Some(target), Ok((transit, updated))) => {
                    prop_assert_eq!(transit.target, target);
                    prop_assert_eq!(updated.status, target);
                    task = updated;
                }
                (None, Err(e)) => prop_assert!(e.is_illegal_transition()),
                (expected, result) => {
                    prop_assert!(false, "{:?} --{}--> expected {:?}, got {:?}",
                        before.status, event, expected, result.map(|(r, _)| r.target));
                }
            }

            prop_assert!(reachable.contains(&task.status));
            if machine.is_terminal(before.status) {
                prop_assert_eq!(task.status, before.status);
            }
            h.advance_secs(1);
        }
    }

    #[test]
    fn subtask_walk_follows_the_table(
        events in proptest::collection::vec(0..SubtaskEvent::ALL.len(), 1..40)
    ) {
        let h = Harness::new(&ConfigFileBuilder::new().build());
        let machine = h.service.machines().subtask.clone();
        let reachable = machine.reachable_from(SubScanTaskStatus::NeverScanned);
        let parent = ScanTask::new("walk", "trivy", "prop", h.now());
        let mut subtask = SubScanTask::new(&parent, "proj", "/walk.jar", h.now());
        let mut executed_times = 0;

        for idx in events {
            let event = SubtaskEvent::ALL[idx];
            let before = subtask.clone();
            let expected = machine.target_of(before.status, event);
            let runtime = h.service.scanners().runtime_for(&before).unwrap();

            let result = SubtaskContext::new(before.clone(), h.now())
                .with_reason("prop")
                .with_runtime(runtime)
                .send(&machine, event);
            match (expected, result) {
                (Some(target), Ok((transit, updated))) => {
                    prop_assert_eq!(transit.target, target);
                    prop_assert_eq!(updated.status, target);
                    if event == SubtaskEvent::Pull {
                        executed_times += 1;
                    }
                    subtask = updated;
                }
                (None, Err(e)) => prop_assert!(e.is_illegal_transition()),
                (expected, result) => {
                    prop_assert!(false, "{:?} --{}--> expected {:?}, got {:?}",
                        before.status, event, expected, result.map(|(r, _)| r.target));
                }
            }

            prop_assert!(reachable.contains(&subtask.status));
            prop_assert_eq!(subtask.executed_times, executed_times);
            if before.status.is_terminal() {
                prop_assert_eq!(subtask.status, before.status);
            }
            h.advance_secs(1);
        }
    }
}
