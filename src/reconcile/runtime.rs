// src/reconcile/runtime.rs

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, trace};

use crate::errors::Result;
use crate::reconcile::sweeps::{Reconciler, SweepKind, SweepReport};

/// Cloneable handle that stops a [`ReconcileRuntime`].
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        // send_replace never fails, even without receivers.
        self.tx.send_replace(true);
    }
}

/// Async shell around [`Reconciler`].
///
/// Every sweep gets its own tokio task: wait `fixed_delay`, run the sweep on
/// the blocking pool, repeat. A sweep therefore never overlaps itself, while
/// different sweeps run independently.
#[derive(Debug)]
pub struct ReconcileRuntime {
    reconciler: Arc<Reconciler>,
    fixed_delay: Duration,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl ReconcileRuntime {
    pub fn new(reconciler: Reconciler, fixed_delay: Duration) -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            reconciler: Arc::new(reconciler),
            fixed_delay,
            shutdown_tx: Arc::new(tx),
            shutdown_rx: rx,
        }
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.shutdown_tx.clone(),
        }
    }

    /// Run every sweep a single time, one after the other.
    pub async fn run_once(&self) -> Result<Vec<(SweepKind, SweepReport)>> {
        let mut reports = Vec::with_capacity(SweepKind::ALL.len());
        for kind in SweepKind::ALL {
            let reconciler = self.reconciler.clone();
            let report = tokio::task::spawn_blocking(move || reconciler.run(kind))
                .await
                .map_err(anyhow::Error::from)?;
            reports.push((kind, report));
        }
        Ok(reports)
    }

    /// Run the sweep loops until the shutdown handle fires.
    pub async fn run(self) -> Result<()> {
        info!(
            fixed_delay_ms = self.fixed_delay.as_millis() as u64,
            "reconciliation runtime started"
        );

        let mut loops = JoinSet::new();
        for kind in SweepKind::ALL {
            loops.spawn(sweep_loop(
                kind,
                self.reconciler.clone(),
                self.fixed_delay,
                self.shutdown_rx.clone(),
            ));
        }

        while let Some(joined) = loops.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "sweep loop aborted");
            }
        }

        info!("reconciliation runtime stopped");
        Ok(())
    }
}

async fn sweep_loop(
    kind: SweepKind,
    reconciler: Arc<Reconciler>,
    delay: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!(sweep = %kind, "sweep loop started");
    while !wait_or_shutdown(delay, &mut shutdown).await {
        let worker = reconciler.clone();
        match tokio::task::spawn_blocking(move || worker.run(kind)).await {
            Ok(report) if report.is_empty() => trace!(sweep = %kind, "nothing to reconcile"),
            Ok(_) => {}
            Err(e) => error!(sweep = %kind, error = %e, "sweep panicked"),
        }
    }
    debug!(sweep = %kind, "sweep loop stopped");
}

/// Sleep for `delay`; returns `true` when shutdown was requested instead.
async fn wait_or_shutdown(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow_and_update() {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(delay) => false,
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}
