// src/config/mod.rs

//! Configuration for the reconciliation scheduler and the scanner registry.
//!
//! - `model.rs` holds the raw TOML shape and the validated form.
//! - `loader.rs` reads files from disk.
//! - `validate.rs` converts raw into validated config (`TryFrom`).
//! - `duration.rs` parses `"3s"`-style durations.

pub mod duration;
pub mod loader;
pub mod model;
pub mod validate;

pub use duration::{format_duration, parse_duration};
pub use loader::{default_config_path, load_and_validate, load_from_path, load_from_str};
pub use model::{
    ConfigFile, RawConfigFile, RawScannerSection, RawSchedulerSection, ScannerConfig,
    SchedulerConfig,
};
