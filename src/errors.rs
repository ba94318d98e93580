// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanflowError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// No transition is registered for `(state, event)` in `machine`.
    #[error("illegal transition in state machine '{machine}': no rule for event {event} from state {state}")]
    IllegalTransition {
        machine: String,
        state: String,
        event: String,
    },

    /// A `(state, event)` pair was registered twice while building `machine`.
    #[error("duplicate transition in state machine '{machine}': event {event} from state {state} is already registered")]
    DuplicateTransition {
        machine: String,
        state: String,
        event: String,
    },

    /// The action selected for a transition returned an error. The transition
    /// must not be persisted.
    #[error("action '{action}' failed in state machine '{machine}': {source}")]
    ActionFailed {
        machine: String,
        action: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Scan task not found: {0}")]
    TaskNotFound(String),

    #[error("Sub scan task not found: {0}")]
    SubtaskNotFound(String),

    /// A record with this id already exists in the store.
    #[error("Duplicate record id: {0}")]
    DuplicateRecord(String),

    #[error("Scanner not found: {0}")]
    ScannerNotFound(String),

    /// A worker reported a sub-task state that does not end a run.
    #[error("not a terminal sub-task state: {0}")]
    NonTerminalTarget(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ScanflowError {
    /// True for errors that signal a rejected transition rather than an
    /// infrastructure problem.
    pub fn is_illegal_transition(&self) -> bool {
        matches!(self, ScanflowError::IllegalTransition { .. })
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, ScanflowError>;
