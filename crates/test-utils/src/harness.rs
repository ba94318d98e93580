use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use scanflow::clock::ManualClock;
use scanflow::config::ConfigFile;
use scanflow::model::{ScanTask, SubScanTask};
use scanflow::reconcile::Reconciler;
use scanflow::service::ScanService;
use scanflow::store::{InMemoryTaskStore, TaskStore};

use crate::recording::RecordingNotifier;

/// Service, reconciler and store wired to a manual clock and a recording
/// notifier.
pub struct Harness {
    pub clock: ManualClock,
    pub store: Arc<InMemoryTaskStore>,
    pub notifier: RecordingNotifier,
    pub service: ScanService,
    pub reconciler: Reconciler,
}

impl Harness {
    pub fn new(config: &ConfigFile) -> Self {
        let clock = ManualClock::new(Self::epoch());
        let store = Arc::new(InMemoryTaskStore::new());
        let notifier = RecordingNotifier::new();
        let service = ScanService::from_config(
            config,
            store.clone(),
            Arc::new(notifier.clone()),
            Arc::new(clock.clone()),
        )
        .expect("service should build from a valid config");
        let reconciler = Reconciler::new(service.clone());
        Self {
            clock,
            store,
            notifier,
            service,
            reconciler,
        }
    }

    /// Fixed start instant so assertions on timestamps stay readable.
    pub fn epoch() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.service.now()
    }

    pub fn advance_secs(&self, secs: i64) {
        self.clock.advance(Duration::seconds(secs));
    }

    pub fn insert_task(&self, task: ScanTask) -> ScanTask {
        self.store.insert_task(task.clone()).unwrap();
        task
    }

    pub fn insert_subtask(&self, subtask: SubScanTask) -> SubScanTask {
        self.store.insert_subtask(subtask.clone()).unwrap();
        subtask
    }

    pub fn task(&self, id: &str) -> ScanTask {
        self.store.get_task(id).unwrap()
    }

    pub fn subtask(&self, id: &str) -> SubScanTask {
        self.store.get_subtask(id).unwrap()
    }
}
