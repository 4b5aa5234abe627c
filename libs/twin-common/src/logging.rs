//! Logging setup shared by the twin services.

use tracing_subscriber::{fmt, EnvFilter};

/// Initialises the global tracing subscriber.
///
/// The `RUST_LOG` environment variable overrides `default_level`, which
/// is typically the service's `--log-level` argument.
pub fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
