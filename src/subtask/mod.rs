// src/subtask/mod.rs

//! Sub-task lifecycle: states, events, the transition table and its actions.

pub mod actions;
pub mod graph;
pub mod status;

pub use actions::{SubtaskContext, subtask_action_catalog};
pub use graph::{SubtaskMachine, build_subtask_machine, subtask_machine};
pub use status::{SubScanTaskStatus, SubtaskEvent, finish_event_of};
