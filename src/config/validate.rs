// src/config/validate.rs

use std::collections::BTreeMap;
use std::time::Duration;

use crate::config::duration::parse_duration;
use crate::config::model::{
    ConfigFile, RawConfigFile, RawScannerSection, RawSchedulerSection, ScannerConfig,
    SchedulerConfig,
};
use crate::errors::{Result, ScanflowError};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = ScanflowError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let scheduler = validate_scheduler(&raw.scheduler)?;
        let scanners = validate_scanners(&raw.scanner)?;
        Ok(ConfigFile::new_unchecked(scheduler, scanners))
    }
}

fn duration_field(section: &str, key: &str, value: &str) -> Result<Duration> {
    parse_duration(value)
        .map_err(|e| ScanflowError::ConfigError(format!("[{section}].{key}: {e}")))
}

fn require_positive(key: &str, value: Duration) -> Result<()> {
    if value.is_zero() {
        return Err(ScanflowError::ConfigError(format!(
            "[scheduler].{key} must be greater than zero"
        )));
    }
    Ok(())
}

fn validate_scheduler(raw: &RawSchedulerSection) -> Result<SchedulerConfig> {
    let fixed_delay = duration_field("scheduler", "fixed_delay", &raw.fixed_delay)?;
    let submit_timeout = duration_field("scheduler", "submit_timeout", &raw.submit_timeout)?;
    let block_timeout = duration_field("scheduler", "block_timeout", &raw.block_timeout)?;
    let execute_timeout = duration_field("scheduler", "execute_timeout", &raw.execute_timeout)?;
    let heartbeat_timeout =
        duration_field("scheduler", "heartbeat_timeout", &raw.heartbeat_timeout)?;
    let max_task_duration =
        duration_field("scheduler", "max_task_duration", &raw.max_task_duration)?;

    require_positive("fixed_delay", fixed_delay)?;
    require_positive("submit_timeout", submit_timeout)?;
    require_positive("execute_timeout", execute_timeout)?;

    if raw.max_execute_times == 0 {
        return Err(ScanflowError::ConfigError(
            "[scheduler].max_execute_times must be >= 1 (got 0)".to_string(),
        ));
    }
    if raw.page_size == 0 {
        return Err(ScanflowError::ConfigError(
            "[scheduler].page_size must be >= 1 (got 0)".to_string(),
        ));
    }

    Ok(SchedulerConfig {
        fixed_delay,
        submit_timeout,
        block_timeout,
        execute_timeout,
        heartbeat_timeout,
        max_task_duration,
        max_execute_times: raw.max_execute_times,
        max_pull_retry: raw.max_pull_retry,
        page_size: raw.page_size,
    })
}

fn validate_scanners(
    raw: &BTreeMap<String, RawScannerSection>,
) -> Result<BTreeMap<String, ScannerConfig>> {
    let mut scanners = BTreeMap::new();
    for (name, section) in raw {
        if name.trim().is_empty() {
            return Err(ScanflowError::ConfigError(
                "scanner names must not be empty".to_string(),
            ));
        }
        if section.kind.trim().is_empty() {
            return Err(ScanflowError::ConfigError(format!(
                "scanner '{name}' has an empty `kind`"
            )));
        }

        let section_name = format!("scanner.{name}");
        let max_scan_duration = section
            .max_scan_duration
            .as_deref()
            .map(|value| duration_field(&section_name, "max_scan_duration", value))
            .transpose()?;
        if max_scan_duration.is_some_and(|d| d.is_zero()) {
            return Err(ScanflowError::ConfigError(format!(
                "[{section_name}].max_scan_duration must be greater than zero"
            )));
        }

        scanners.insert(
            name.clone(),
            ScannerConfig {
                name: name.clone(),
                kind: section.kind.clone(),
                version: section.version.clone(),
                max_scan_duration,
            },
        );
    }
    Ok(scanners)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::loader::load_from_str;

    #[test]
    fn empty_file_uses_defaults() {
        let cfg = ConfigFile::try_from(load_from_str("").unwrap()).unwrap();
        assert_eq!(cfg.scheduler, SchedulerConfig::default());
        assert!(cfg.scanners.is_empty());
    }

    #[test]
    fn zero_block_timeout_disables_sweep() {
        let raw = load_from_str("[scheduler]\nblock_timeout = \"0s\"\n").unwrap();
        let cfg = ConfigFile::try_from(raw).unwrap();
        assert!(!cfg.scheduler.block_timeout_enabled());
    }

    #[test]
    fn zero_fixed_delay_is_rejected() {
        let raw = load_from_str("[scheduler]\nfixed_delay = \"0s\"\n").unwrap();
        let err = ConfigFile::try_from(raw).unwrap_err();
        assert!(err.to_string().contains("fixed_delay"));
    }

    #[test]
    fn bad_scanner_duration_names_the_section() {
        let raw = load_from_str(
            "[scanner.trivy]\nkind = \"trivy\"\nmax_scan_duration = \"ten minutes\"\n",
        )
        .unwrap();
        let err = ConfigFile::try_from(raw).unwrap_err();
        assert!(err.to_string().contains("scanner.trivy"), "{err}");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(load_from_str("[scheduler]\nperiod = \"3s\"\n").is_err());
    }
}
