//! Logging setup for embedding applications.
//!
//! The crate itself only emits `tracing` events; hosts that already run a
//! subscriber need nothing from here. [`init_logging`] is a convenience
//! for binaries and examples that want sensible console output:
//! - Configurable via the `RUST_LOG` environment variable
//! - Defaults to INFO when `RUST_LOG` is unset

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Initialize console logging with an environment-driven filter.
///
/// Installs a global subscriber; calling it twice in one process is an
/// error, so hosts with their own subscriber should skip this.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_logging() -> Result<(), tracing_subscriber::util::TryInitError> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .try_init()
}
