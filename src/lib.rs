// src/lib.rs

pub mod cli;
pub mod clock;
pub mod config;
pub mod errors;
pub mod logging;
pub mod model;
pub mod notify;
pub mod reconcile;
pub mod service;
pub mod statemachine;
pub mod store;
pub mod subtask;
pub mod task;

use std::fmt::Display;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::clock::SystemClock;
use crate::config::{ConfigFile, default_config_path, format_duration, load_and_validate};
use crate::model::{ScannerRegistry, StoreSnapshot};
use crate::notify::{ChannelNotifier, NoopNotifier, Notification};
use crate::reconcile::{ReconcileRuntime, Reconciler};
use crate::service::{Machines, ScanService};
use crate::statemachine::{Label, Registration, StateMachine};
use crate::store::{InMemoryTaskStore, TaskStore};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the store (optionally seeded from `--state`)
/// - state machines, service and reconciler
/// - the notification consumer
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_config(Path::new(&args.config))?;

    if args.dry_run {
        print_dry_run(&cfg)?;
        return Ok(());
    }

    let store = match &args.state {
        Some(path) => load_state(Path::new(path))?,
        None => InMemoryTaskStore::new(),
    };
    let store: Arc<dyn TaskStore> = Arc::new(store);

    // Stand-in for the dispatcher: log what would be sent to workers.
    let (notifier, notifications) = ChannelNotifier::new();
    tokio::spawn(log_notifications(notifications));

    let service = ScanService::from_config(
        &cfg,
        store.clone(),
        Arc::new(notifier),
        Arc::new(SystemClock),
    )?;
    let runtime = ReconcileRuntime::new(Reconciler::new(service), cfg.scheduler.fixed_delay);

    if args.once {
        let reports = runtime.run_once().await?;
        let reports: Vec<_> = reports
            .into_iter()
            .map(|(sweep, report)| serde_json::json!({ "sweep": sweep, "report": report }))
            .collect();
        let output = serde_json::json!({
            "reports": reports,
            "state": store.snapshot()?,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    // Ctrl-C → graceful shutdown.
    {
        let handle = runtime.shutdown_handle();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            info!("shutdown requested");
            handle.shutdown();
        });
    }

    runtime.run().await?;
    Ok(())
}

/// Load and validate `path`. A missing default config file falls back to
/// built-in defaults; any other missing file is an error.
fn load_config(path: &Path) -> Result<ConfigFile> {
    if !path.exists() && path == default_config_path().as_path() {
        info!(path = %path.display(), "no config file found; using defaults");
        return Ok(ConfigFile::default());
    }
    let cfg = load_and_validate(path)?;
    debug!(path = %path.display(), scanners = cfg.scanners.len(), "config loaded");
    Ok(cfg)
}

fn load_state(path: &Path) -> Result<InMemoryTaskStore> {
    let contents = fs::read_to_string(path)?;
    let snapshot: StoreSnapshot = serde_json::from_str(&contents)?;
    info!(
        path = %path.display(),
        tasks = snapshot.tasks.len(),
        subtasks = snapshot.subtasks.len(),
        "store seeded from snapshot"
    );
    Ok(InMemoryTaskStore::from_snapshot(snapshot)?)
}

async fn log_notifications(mut rx: mpsc::UnboundedReceiver<Notification>) {
    while let Some(notification) = rx.recv().await {
        match notification {
            Notification::TaskReset { task_id } => {
                info!(task_id = %task_id, "task ready for resubmission");
            }
            Notification::SubtaskRedispatch { runtime } => {
                info!(
                    subtask_id = %runtime.subtask_id,
                    scanner = %runtime.scanner.name,
                    full_path = %runtime.full_path,
                    "sub-task queued for redispatch"
                );
            }
            Notification::SubtaskFinished {
                subtask_id, status, ..
            } => {
                debug!(subtask_id = %subtask_id, status = %status, "sub-task finished");
            }
        }
    }
}

/// Dry-run output: effective configuration and both transition tables.
fn print_dry_run(cfg: &ConfigFile) -> Result<()> {
    let s = &cfg.scheduler;
    println!("scanflow dry-run");
    println!("  scheduler.fixed_delay = {}", format_duration(s.fixed_delay));
    println!("  scheduler.submit_timeout = {}", format_duration(s.submit_timeout));
    println!(
        "  scheduler.block_timeout = {}{}",
        format_duration(s.block_timeout),
        if s.block_timeout_enabled() { "" } else { " (disabled)" }
    );
    println!("  scheduler.execute_timeout = {}", format_duration(s.execute_timeout));
    println!("  scheduler.heartbeat_timeout = {}", format_duration(s.heartbeat_timeout));
    println!("  scheduler.max_task_duration = {}", format_duration(s.max_task_duration));
    println!("  scheduler.max_execute_times = {}", s.max_execute_times);
    println!("  scheduler.max_pull_retry = {}", s.max_pull_retry);
    println!("  scheduler.page_size = {}", s.page_size);
    println!();

    println!("scanners ({}):", cfg.scanners.len());
    for (name, scanner) in cfg.scanners.iter() {
        println!("  - {name}");
        println!("      kind: {}", scanner.kind);
        if let Some(ref version) = scanner.version {
            println!("      version: {version}");
        }
        if let Some(budget) = scanner.max_scan_duration {
            println!("      max_scan_duration: {}", format_duration(budget));
        }
    }
    println!();

    let scanners = Arc::new(ScannerRegistry::from_config(cfg));
    let machines = Machines::new(Arc::new(NoopNotifier), scanners)?;
    print_transitions(&machines.task);
    println!();
    print_transitions(&machines.subtask);

    debug!("dry-run complete (nothing reconciled)");
    Ok(())
}

fn print_transitions<S: Label, E: Label, C>(machine: &StateMachine<S, E, C>) {
    println!("{} transitions ({}):", machine.name(), machine.transitions().len());
    for transition in machine.transitions() {
        let sources = join(transition.sources());
        let batch = match transition.registration() {
            Registration::Batch => " (batch)",
            Registration::Single => "",
        };
        println!(
            "  {sources} --{}--> {}{batch}",
            transition.event(),
            transition.target()
        );
    }
}

fn join<T: Display>(items: &[T]) -> String {
    if items.len() == 1 {
        return items[0].to_string();
    }
    let parts: Vec<String> = items.iter().map(|i| i.to_string()).collect();
    format!("{{{}}}", parts.join(", "))
}
