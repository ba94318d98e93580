// tests/config_loading.rs

use std::io::Write;
use std::time::Duration;

use scanflow::config::load_and_validate;
use scanflow::errors::ScanflowError;
use tempfile::NamedTempFile;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{contents}").unwrap();
    file
}

#[test]
fn full_file_is_parsed() {
    let file = write_config(
        r#"
[scheduler]
fixed_delay = "500ms"
submit_timeout = "20m"
block_timeout = "0"
execute_timeout = "1h"
heartbeat_timeout = "30s"
max_execute_times = 5
page_size = 50

[scanner.trivy]
kind = "trivy"
version = "0.50.1"
max_scan_duration = "10m"

[scanner.arrowhead]
kind = "arrowhead"
"#,
    );

    let cfg = load_and_validate(file.path()).unwrap();
    let s = &cfg.scheduler;
    assert_eq!(s.fixed_delay, Duration::from_millis(500));
    assert_eq!(s.submit_timeout, Duration::from_secs(1200));
    assert!(!s.block_timeout_enabled());
    assert_eq!(s.execute_timeout, Duration::from_secs(3600));
    assert_eq!(s.heartbeat_timeout, Duration::from_secs(30));
    assert_eq!(s.max_task_duration, Duration::ZERO);
    assert_eq!(s.max_execute_times, 5);
    assert_eq!(s.max_pull_retry, 3);
    assert_eq!(s.page_size, 50);

    let trivy = &cfg.scanners["trivy"];
    assert_eq!(trivy.version.as_deref(), Some("0.50.1"));
    assert_eq!(trivy.max_scan_duration, Some(Duration::from_secs(600)));
    assert_eq!(cfg.scanners["arrowhead"].max_scan_duration, None);
}

#[test]
fn zero_execute_timeout_returns_config_error() {
    let file = write_config(
        r#"
[scheduler]
execute_timeout = "0s"
"#,
    );

    match load_and_validate(file.path()) {
        Err(ScanflowError::ConfigError(msg)) => {
            assert!(msg.contains("execute_timeout"));
        }
        Err(e) => panic!("Expected ConfigError, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn bad_unit_names_the_key() {
    let file = write_config(
        r#"
[scheduler]
submit_timeout = "2d"
"#,
    );

    match load_and_validate(file.path()) {
        Err(ScanflowError::ConfigError(msg)) => {
            assert!(msg.contains("[scheduler].submit_timeout"));
            assert!(msg.contains("unsupported duration unit"));
        }
        Err(e) => panic!("Expected ConfigError, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn scanner_without_kind_is_a_toml_error() {
    let file = write_config(
        r#"
[scanner.trivy]
version = "1"
"#,
    );

    assert!(matches!(
        load_and_validate(file.path()),
        Err(ScanflowError::TomlError(_))
    ));
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = load_and_validate(dir.path().join("Scanflow.toml"));
    assert!(matches!(result, Err(ScanflowError::IoError(_))));
}

#[test]
fn overflowing_duration_returns_config_error() {
    let file = write_config(
        r#"
[scheduler]
submit_timeout = "999999999999999999m"
"#,
    );

    match load_and_validate(file.path()) {
        Err(ScanflowError::ConfigError(msg)) => {
            assert!(msg.contains("[scheduler].submit_timeout"));
            assert!(msg.contains("too large"));
        }
        Err(e) => panic!("Expected ConfigError, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}
