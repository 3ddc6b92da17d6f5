//! Structured logging setup.

use tracing_subscriber::EnvFilter;

/// Install the process-wide tracing subscriber.
///
/// Reads the filter from `RUST_LOG`, defaulting to `info`. Calling this
/// more than once is harmless; the first subscriber stays installed.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
