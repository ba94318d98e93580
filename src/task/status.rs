// src/task/status.rs

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a [`ScanTask`](crate::model::ScanTask).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanTaskStatus {
    /// Created, waiting to be submitted. Initial state.
    Pending,
    /// Sub-tasks are being created and queued.
    ScanningSubmitting,
    /// All sub-tasks queued; waiting for them to finish.
    ScanningSubmitted,
    Finished,
    Stopping,
    Stopped,
}

impl ScanTaskStatus {
    pub const ALL: [ScanTaskStatus; 6] = [
        ScanTaskStatus::Pending,
        ScanTaskStatus::ScanningSubmitting,
        ScanTaskStatus::ScanningSubmitted,
        ScanTaskStatus::Finished,
        ScanTaskStatus::Stopping,
        ScanTaskStatus::Stopped,
    ];

    /// States the submit-timeout sweep watches.
    pub const SUBMITTING: [ScanTaskStatus; 2] =
        [ScanTaskStatus::Pending, ScanTaskStatus::ScanningSubmitting];

    pub fn is_terminal(self) -> bool {
        matches!(self, ScanTaskStatus::Finished | ScanTaskStatus::Stopped)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ScanTaskStatus::Pending => "PENDING",
            ScanTaskStatus::ScanningSubmitting => "SCANNING_SUBMITTING",
            ScanTaskStatus::ScanningSubmitted => "SCANNING_SUBMITTED",
            ScanTaskStatus::Finished => "FINISHED",
            ScanTaskStatus::Stopping => "STOPPING",
            ScanTaskStatus::Stopped => "STOPPED",
        }
    }
}

impl fmt::Display for ScanTaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanTaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ScanTaskStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown scan task status: {s}"))
    }
}

/// Events accepted by the scan-task graph.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanTaskEvent {
    Create,
    Submit,
    FinishSubmit,
    Reset,
    Finish,
    Stop,
    FinishStop,
}

impl ScanTaskEvent {
    pub const ALL: [ScanTaskEvent; 7] = [
        ScanTaskEvent::Create,
        ScanTaskEvent::Submit,
        ScanTaskEvent::FinishSubmit,
        ScanTaskEvent::Reset,
        ScanTaskEvent::Finish,
        ScanTaskEvent::Stop,
        ScanTaskEvent::FinishStop,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ScanTaskEvent::Create => "CREATE",
            ScanTaskEvent::Submit => "SUBMIT",
            ScanTaskEvent::FinishSubmit => "FINISH_SUBMIT",
            ScanTaskEvent::Reset => "RESET",
            ScanTaskEvent::Finish => "FINISH",
            ScanTaskEvent::Stop => "STOP",
            ScanTaskEvent::FinishStop => "FINISH_STOP",
        }
    }
}

impl fmt::Display for ScanTaskEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parses_wire_names() {
        assert_eq!(
            "scanning_submitting".parse::<ScanTaskStatus>().unwrap(),
            ScanTaskStatus::ScanningSubmitting
        );
        assert!("RUNNING".parse::<ScanTaskStatus>().is_err());
    }

    #[test]
    fn serde_uses_screaming_case() {
        let json = serde_json::to_string(&ScanTaskStatus::ScanningSubmitted).unwrap();
        assert_eq!(json, "\"SCANNING_SUBMITTED\"");
    }
}
