//! Logging setup
//!
//! The library only emits `tracing` events. Applications embedding odb call
//! [`init`] (or install their own subscriber) to see them.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Install a fmt subscriber filtered by `RUST_LOG`, defaulting to "info".
///
/// Does nothing if a global subscriber is already set.
pub fn init() {
    init_with_level("info")
}

/// Install a fmt subscriber filtered by `RUST_LOG`, defaulting to `level`.
pub fn init_with_level(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .try_init();
}

/// Verbose logging captured by the test harness
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}
