// src/task/mod.rs

//! Scan-task lifecycle: states, events, the transition table and its actions.

pub mod actions;
pub mod graph;
pub mod status;

pub use actions::{TaskContext, task_action_catalog};
pub use graph::{ScanTaskMachine, build_scan_task_machine, scan_task_machine};
pub use status::{ScanTaskEvent, ScanTaskStatus};
