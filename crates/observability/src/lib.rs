//! Logging setup and per-step observation of lifecycle operations.

/// Install the process-wide subscriber. Repeated calls are no-ops.
pub fn init() {
    tracing::init();
}

/// Subscriber and filter configuration.
pub mod tracing;

/// Per-step timing of lifecycle operations.
pub mod observer;

pub use observer::{
    observe, observe_async, InMemoryMetrics, LifecycleObserver, StepOutcome, StepStats,
    TracingObserver,
};
