// src/subtask/status.rs

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a [`SubScanTask`](crate::model::SubScanTask).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubScanTaskStatus {
    /// Initial state.
    NeverScanned,
    /// Waiting for a worker to pull it.
    Created,
    /// Held back (e.g. project quota reached) until notified.
    Blocked,
    /// Claimed by a worker, not yet running.
    Pulled,
    Executing,
    Success,
    Failed,
    Timeout,
    BlockTimeout,
    Stopped,
}

impl SubScanTaskStatus {
    pub const ALL: [SubScanTaskStatus; 10] = [
        SubScanTaskStatus::NeverScanned,
        SubScanTaskStatus::Created,
        SubScanTaskStatus::Blocked,
        SubScanTaskStatus::Pulled,
        SubScanTaskStatus::Executing,
        SubScanTaskStatus::Success,
        SubScanTaskStatus::Failed,
        SubScanTaskStatus::Timeout,
        SubScanTaskStatus::BlockTimeout,
        SubScanTaskStatus::Stopped,
    ];

    /// States in which a worker holds the sub-task.
    pub const RUNNING: [SubScanTaskStatus; 2] =
        [SubScanTaskStatus::Pulled, SubScanTaskStatus::Executing];

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SubScanTaskStatus::Success
                | SubScanTaskStatus::Failed
                | SubScanTaskStatus::Timeout
                | SubScanTaskStatus::BlockTimeout
                | SubScanTaskStatus::Stopped
        )
    }

    pub fn is_running(self) -> bool {
        SubScanTaskStatus::RUNNING.contains(&self)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SubScanTaskStatus::NeverScanned => "NEVER_SCANNED",
            SubScanTaskStatus::Created => "CREATED",
            SubScanTaskStatus::Blocked => "BLOCKED",
            SubScanTaskStatus::Pulled => "PULLED",
            SubScanTaskStatus::Executing => "EXECUTING",
            SubScanTaskStatus::Success => "SUCCESS",
            SubScanTaskStatus::Failed => "FAILED",
            SubScanTaskStatus::Timeout => "TIMEOUT",
            SubScanTaskStatus::BlockTimeout => "BLOCK_TIMEOUT",
            SubScanTaskStatus::Stopped => "STOPPED",
        }
    }
}

impl fmt::Display for SubScanTaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubScanTaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SubScanTaskStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown sub scan task status: {s}"))
    }
}

/// Events accepted by the sub-task graph.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubtaskEvent {
    Create,
    Block,
    Notify,
    Pull,
    Execute,
    Retry,
    Success,
    Failed,
    Timeout,
    BlockTimeout,
    Stop,
}

impl SubtaskEvent {
    pub const ALL: [SubtaskEvent; 11] = [
        SubtaskEvent::Create,
        SubtaskEvent::Block,
        SubtaskEvent::Notify,
        SubtaskEvent::Pull,
        SubtaskEvent::Execute,
        SubtaskEvent::Retry,
        SubtaskEvent::Success,
        SubtaskEvent::Failed,
        SubtaskEvent::Timeout,
        SubtaskEvent::BlockTimeout,
        SubtaskEvent::Stop,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SubtaskEvent::Create => "CREATE",
            SubtaskEvent::Block => "BLOCK",
            SubtaskEvent::Notify => "NOTIFY",
            SubtaskEvent::Pull => "PULL",
            SubtaskEvent::Execute => "EXECUTE",
            SubtaskEvent::Retry => "RETRY",
            SubtaskEvent::Success => "SUCCESS",
            SubtaskEvent::Failed => "FAILED",
            SubtaskEvent::Timeout => "TIMEOUT",
            SubtaskEvent::BlockTimeout => "BLOCK_TIMEOUT",
            SubtaskEvent::Stop => "STOP",
        }
    }
}

impl fmt::Display for SubtaskEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event that moves a running sub-task into the terminal state `target`.
///
/// Returns `None` for non-terminal targets.
pub fn finish_event_of(target: SubScanTaskStatus) -> Option<SubtaskEvent> {
    match target {
        SubScanTaskStatus::Success => Some(SubtaskEvent::Success),
        SubScanTaskStatus::Failed => Some(SubtaskEvent::Failed),
        SubScanTaskStatus::Timeout => Some(SubtaskEvent::Timeout),
        SubScanTaskStatus::BlockTimeout => Some(SubtaskEvent::BlockTimeout),
        SubScanTaskStatus::Stopped => Some(SubtaskEvent::Stop),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_event_covers_every_terminal_state() {
        for status in SubScanTaskStatus::ALL {
            assert_eq!(finish_event_of(status).is_some(), status.is_terminal(), "{status}");
        }
    }

    #[test]
    fn parses_block_timeout() {
        assert_eq!(
            "BLOCK_TIMEOUT".parse::<SubScanTaskStatus>().unwrap(),
            SubScanTaskStatus::BlockTimeout
        );
    }
}
