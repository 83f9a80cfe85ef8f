//! Tracing/logging initialization.
//!
//! Logs go to stderr so tools can keep stdout for their own output.

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";

fn filter_or(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Install JSON logging for the process, configurable via `RUST_LOG`.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter_or(DEFAULT_FILTER))
        .json()
        .flatten_event(true)
        .with_current_span(false)
        .with_thread_names(true)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Plain-text logging captured by the test harness. Quiet unless `RUST_LOG`
/// says otherwise.
pub fn init_pretty() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter_or("warn"))
        .with_thread_names(true)
        .with_test_writer()
        .try_init();
}
