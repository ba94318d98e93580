#![allow(dead_code)]

use std::sync::Once;
use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

/// Initialise tracing for integration tests.
///
/// Output is captured per test and only shown for failures unless run with
/// `-- --nocapture`. Levels come from `RUST_LOG`, e.g.
/// `RUST_LOG=scanflow=debug cargo test`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}
