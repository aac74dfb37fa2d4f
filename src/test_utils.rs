//! Shared helpers for unit and integration tests.

use std::sync::Once;

static INIT_LOGGING: Once = Once::new();

/// Initializes tracing output for tests.
///
/// Safe to call multiple times; only the first call installs the
/// subscriber. Honors `RUST_LOG`, defaulting to `debug` for this crate.
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("strand=debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}
