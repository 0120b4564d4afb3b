//! Diagnostic tracing for debugging warden.
//!
//! Output goes to stderr only: stdout carries the JSON response to the host
//! and must stay machine-readable. Trace records and the status cache are
//! product artifacts and are written regardless of the log filter.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter variable checked before `RUST_LOG`.
pub const LOG_ENV: &str = "WARDEN_LOG";

/// Initialize the tracing subscriber.
///
/// Reads `WARDEN_LOG`, then `RUST_LOG`. Defaults to `warn`.
/// Output: stderr, compact format.
///
/// # Example
/// ```bash
/// WARDEN_LOG=warden=debug warden hook < event.json
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}
