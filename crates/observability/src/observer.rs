//! Step observers.
//!
//! Orchestration code never logs its own timings. Each step is wrapped with
//! [`observe`] / [`observe_async`], which report to an injected
//! [`LifecycleObserver`].

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Succeeded,
    Failed,
}

/// Receives one notification per finished step.
pub trait LifecycleObserver: Send + Sync {
    fn step_finished(&self, step: &'static str, outcome: StepOutcome, elapsed: Duration);
}

impl<O: LifecycleObserver + ?Sized> LifecycleObserver for Arc<O> {
    fn step_finished(&self, step: &'static str, outcome: StepOutcome, elapsed: Duration) {
        (**self).step_finished(step, outcome, elapsed)
    }
}

/// Emits one `tracing` event per step.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl LifecycleObserver for TracingObserver {
    fn step_finished(&self, step: &'static str, outcome: StepOutcome, elapsed: Duration) {
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        match outcome {
            StepOutcome::Succeeded => {
                ::tracing::info!(step, elapsed_ms, "lifecycle step finished")
            }
            StepOutcome::Failed => {
                ::tracing::warn!(step, elapsed_ms, "lifecycle step failed")
            }
        }
    }
}

/// Aggregated counters for one step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StepStats {
    pub succeeded: u64,
    pub failed: u64,
    pub total_micros: u64,
}

/// In-process metrics: counts and cumulative time per step.
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    steps: Mutex<BTreeMap<&'static str, StepStats>>,
    forward: Option<TracingObserver>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also log every step through [`TracingObserver`].
    pub fn with_tracing() -> Self {
        Self {
            steps: Mutex::new(BTreeMap::new()),
            forward: Some(TracingObserver),
        }
    }

    pub fn snapshot(&self) -> BTreeMap<&'static str, StepStats> {
        match self.steps.lock() {
            Ok(steps) => steps.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn step(&self, step: &str) -> StepStats {
        self.snapshot().get(step).cloned().unwrap_or_default()
    }
}

impl LifecycleObserver for InMemoryMetrics {
    fn step_finished(&self, step: &'static str, outcome: StepOutcome, elapsed: Duration) {
        {
            let mut steps = match self.steps.lock() {
                Ok(s) => s,
                Err(poisoned) => poisoned.into_inner(),
            };
            let stats = steps.entry(step).or_default();
            match outcome {
                StepOutcome::Succeeded => stats.succeeded += 1,
                StepOutcome::Failed => stats.failed += 1,
            }
            stats.total_micros = stats
                .total_micros
                .saturating_add(elapsed.as_micros().min(u128::from(u64::MAX)) as u64);
        }

        if let Some(forward) = &self.forward {
            forward.step_finished(step, outcome, elapsed);
        }
    }
}

/// Run a synchronous step and report its outcome.
pub fn observe<T, E>(
    observer: &dyn LifecycleObserver,
    step: &'static str,
    f: impl FnOnce() -> Result<T, E>,
) -> Result<T, E> {
    let started = Instant::now();
    let result = f();
    observer.step_finished(step, outcome_of(&result), started.elapsed());
    result
}

/// Await a step and report its outcome.
pub async fn observe_async<T, E, F>(
    observer: &dyn LifecycleObserver,
    step: &'static str,
    fut: F,
) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    let started = Instant::now();
    let result = fut.await;
    observer.step_finished(step, outcome_of(&result), started.elapsed());
    result
}

fn outcome_of<T, E>(result: &Result<T, E>) -> StepOutcome {
    if result.is_ok() {
        StepOutcome::Succeeded
    } else {
        StepOutcome::Failed
    }
}
