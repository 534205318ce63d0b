//! Tracing setup for the dreamwatch binary.
//!
//! Diagnostics go to stderr via `RUST_LOG`. The session's own artifacts
//! (agent log, reports) are written under the data directory regardless of
//! the filter.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`. Defaults to `warn` if unset, so shutdown-step failures
/// are always visible.
///
/// # Example
/// ```bash
/// RUST_LOG=dreamwatch=debug dreamwatch "refactor auth module"
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
