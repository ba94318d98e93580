// src/config/model.rs

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [scheduler]
/// fixed_delay = "3s"
/// submit_timeout = "1200s"
/// block_timeout = "0s"      # disables the block-timeout sweep
/// execute_timeout = "1200s"
///
/// [scanner.trivy]
/// kind = "trivy"
/// max_scan_duration = "10m"
/// ```
///
/// All sections are optional and have reasonable defaults. This raw form
/// keeps durations as strings; convert it with `ConfigFile::try_from`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    /// Reconciliation settings from `[scheduler]`.
    #[serde(default)]
    pub scheduler: RawSchedulerSection,

    /// Scanner definitions from `[scanner.<name>]`.
    #[serde(default)]
    pub scanner: BTreeMap<String, RawScannerSection>,
}

/// `[scheduler]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawSchedulerSection {
    /// Delay between two runs of the same sweep.
    #[serde(default = "default_fixed_delay")]
    pub fixed_delay: String,

    /// Age after which a task stuck in a submitting state is reset.
    #[serde(default = "default_timeout")]
    pub submit_timeout: String,

    /// Age after which a blocked sub-task is finished as `BLOCK_TIMEOUT`.
    /// Zero disables the sweep.
    #[serde(default = "default_timeout")]
    pub block_timeout: String,

    /// Run budget for scanners that do not declare `max_scan_duration`.
    #[serde(default = "default_timeout")]
    pub execute_timeout: String,

    /// Heartbeat staleness that counts as an execution timeout. Zero disables.
    #[serde(default = "default_disabled")]
    pub heartbeat_timeout: String,

    /// Absolute sub-task age that counts as an execution timeout. Zero disables.
    #[serde(default = "default_disabled")]
    pub max_task_duration: String,

    /// Pulls allowed before a timed out sub-task is finished as `TIMEOUT`.
    #[serde(default = "default_max_execute_times")]
    pub max_execute_times: u32,

    /// Claim attempts a worker makes per pull before giving up.
    #[serde(default = "default_max_pull_retry")]
    pub max_pull_retry: u32,

    /// Page size of claim-all queries.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_fixed_delay() -> String {
    "3s".to_string()
}

fn default_timeout() -> String {
    "1200s".to_string()
}

fn default_disabled() -> String {
    "0s".to_string()
}

fn default_max_execute_times() -> u32 {
    3
}

fn default_max_pull_retry() -> u32 {
    3
}

fn default_page_size() -> usize {
    1000
}

impl Default for RawSchedulerSection {
    fn default() -> Self {
        Self {
            fixed_delay: default_fixed_delay(),
            submit_timeout: default_timeout(),
            block_timeout: default_timeout(),
            execute_timeout: default_timeout(),
            heartbeat_timeout: default_disabled(),
            max_task_duration: default_disabled(),
            max_execute_times: default_max_execute_times(),
            max_pull_retry: default_max_pull_retry(),
            page_size: default_page_size(),
        }
    }
}

/// `[scanner.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawScannerSection {
    /// Scanner engine type, e.g. `"trivy"` or `"arrowhead"`.
    pub kind: String,

    #[serde(default)]
    pub version: Option<String>,

    /// Per-run budget; falls back to `[scheduler].execute_timeout`.
    #[serde(default)]
    pub max_scan_duration: Option<String>,
}

/// Validated configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    pub scheduler: SchedulerConfig,
    pub scanners: BTreeMap<String, ScannerConfig>,
}

impl ConfigFile {
    /// Internal constructor used after validation.
    pub(crate) fn new_unchecked(
        scheduler: SchedulerConfig,
        scanners: BTreeMap<String, ScannerConfig>,
    ) -> Self {
        Self {
            scheduler,
            scanners,
        }
    }
}

/// Parsed `[scheduler]` values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub fixed_delay: Duration,
    pub submit_timeout: Duration,
    pub block_timeout: Duration,
    pub execute_timeout: Duration,
    pub heartbeat_timeout: Duration,
    pub max_task_duration: Duration,
    pub max_execute_times: u32,
    pub max_pull_retry: u32,
    pub page_size: usize,
}

impl SchedulerConfig {
    /// The block-timeout sweep only runs with a non-zero timeout.
    pub fn block_timeout_enabled(&self) -> bool {
        !self.block_timeout.is_zero()
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            fixed_delay: Duration::from_secs(3),
            submit_timeout: Duration::from_secs(1200),
            block_timeout: Duration::from_secs(1200),
            execute_timeout: Duration::from_secs(1200),
            heartbeat_timeout: Duration::ZERO,
            max_task_duration: Duration::ZERO,
            max_execute_times: default_max_execute_times(),
            max_pull_retry: default_max_pull_retry(),
            page_size: default_page_size(),
        }
    }
}

/// Parsed `[scanner.<name>]` values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannerConfig {
    pub name: String,
    pub kind: String,
    pub version: Option<String>,
    pub max_scan_duration: Option<Duration>,
}
