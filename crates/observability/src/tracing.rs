//! Structured log output for the engine.

use tracing_subscriber::EnvFilter;

/// Install the process-wide subscriber: JSON lines on stdout, one object per
/// event, level filtering from `RUST_LOG` (default `info`).
///
/// Calling this twice is harmless; the second install attempt is discarded.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .json()
        .flatten_event(true)
        .with_current_span(false)
        .with_target(false)
        .with_env_filter(filter)
        .try_init();
}
