//! Process-wide subscriber setup.

use tracing_subscriber::EnvFilter;

// Query-level sqlx and connection-level hyper logs drown out request logs.
const DEFAULT_DIRECTIVES: &str = "info,sqlx=warn,hyper=warn";

/// Install the JSON subscriber. `RUST_LOG` overrides the default filter.
///
/// Later calls leave the first subscriber in place.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_current_span(true)
        .with_target(true)
        .try_init();
}
