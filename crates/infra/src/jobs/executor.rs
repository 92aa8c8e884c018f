//! Job executor with retry and backoff logic.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::store::JobStore;
use super::types::{Job, JobKind, JobResult, JobStatus};

/// Runs one kind of job.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> JobResult;
}

#[derive(Debug, Clone)]
pub struct JobExecutorConfig {
    /// How often to poll when the queue is empty
    pub poll_interval: Duration,
    pub max_concurrent: usize,
    /// Name for logging
    pub name: String,
}

impl Default for JobExecutorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            max_concurrent: 4,
            name: "job-executor".to_string(),
        }
    }
}

impl JobExecutorConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max.max(1);
        self
    }
}

/// Executor runtime statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ExecutorStats {
    pub jobs_processed: u64,
    pub jobs_succeeded: u64,
    pub jobs_discarded: u64,
    pub jobs_failed: u64,
    pub jobs_dead_lettered: u64,
    pub current_running: usize,
    pub uptime_secs: u64,
}

type SharedStats = Arc<Mutex<ExecutorStats>>;

fn with_stats(stats: &SharedStats, f: impl FnOnce(&mut ExecutorStats)) {
    let mut guard = match stats.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    };
    f(&mut guard);
}

/// Handle to control a running executor.
#[derive(Debug)]
pub struct JobExecutorHandle {
    shutdown: watch::Sender<bool>,
    join: Option<JoinHandle<()>>,
    stats: SharedStats,
}

impl JobExecutorHandle {
    /// Stop claiming new jobs and wait for the poll loop to exit.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(join) = self.join.take() {
            if let Err(e) = join.await {
                error!(error = %e, "job executor task panicked");
            }
        }
    }

    pub fn stats(&self) -> ExecutorStats {
        match self.stats.lock() {
            Ok(s) => s.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

/// Terminal state of one execution, as seen by the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Execution {
    Completed,
    Discarded(String),
    /// Will be retried after backoff.
    Retrying(String),
    DeadLettered(String),
}

/// Background job executor.
///
/// Polls a job store for due jobs, runs them with the handler registered for
/// their kind, and applies retries and dead-lettering.
pub struct JobExecutor<S: JobStore> {
    store: S,
    handlers: HashMap<JobKind, Arc<dyn JobHandler>>,
}

impl<S: JobStore + 'static> JobExecutor<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            handlers: HashMap::new(),
        }
    }

    pub fn register_handler(&mut self, kind: JobKind, handler: Arc<dyn JobHandler>) {
        self.handlers.insert(kind, handler);
    }

    pub fn with_handler(mut self, kind: JobKind, handler: Arc<dyn JobHandler>) -> Self {
        self.register_handler(kind, handler);
        self
    }

    /// Spawn the poll loop on the current tokio runtime.
    pub fn spawn(self, config: JobExecutorConfig) -> JobExecutorHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let stats: SharedStats = Arc::new(Mutex::new(ExecutorStats::default()));

        let join = tokio::spawn(executor_loop(Arc::new(self), config, shutdown_rx, stats.clone()));

        JobExecutorHandle {
            shutdown: shutdown_tx,
            join: Some(join),
            stats,
        }
    }

    /// Run an already-claimed job and persist the outcome.
    pub async fn execute(&self, job: &mut Job) -> Execution {
        let started = Utc::now();

        let result = match self.handlers.get(&job.kind) {
            Some(handler) => handler.handle(job).await,
            None => JobResult::Failure(format!("no handler for job kind: {}", job.kind)),
        };

        let execution = match result {
            JobResult::Success => {
                job.mark_completed(started);
                debug!(job_id = %job.id, kind = %job.kind, "job completed");
                Execution::Completed
            }
            JobResult::Discarded(reason) => {
                job.mark_completed(started);
                info!(job_id = %job.id, kind = %job.kind, reason = %reason, "job discarded");
                Execution::Discarded(reason)
            }
            JobResult::Failure(error) => {
                job.mark_failed(error.clone(), started);
                if matches!(job.status, JobStatus::DeadLettered { .. }) {
                    Execution::DeadLettered(error)
                } else {
                    debug!(job_id = %job.id, attempt = job.attempt, error = %error, "job failed, will retry");
                    Execution::Retrying(error)
                }
            }
        };

        // Finished jobs leave the store; only retries are written back.
        let persisted = match &execution {
            Execution::Completed | Execution::Discarded(_) => self.store.complete(job),
            Execution::Retrying(_) => self.store.update(job),
            Execution::DeadLettered(reason) => {
                warn!(job_id = %job.id, kind = %job.kind, attempts = job.attempt, error = %reason, "job dead-lettered");
                self.store.dead_letter(job)
            }
        };
        if let Err(e) = persisted {
            error!(job_id = %job.id, error = %e, "failed to persist job outcome");
        }

        execution
    }
}

async fn executor_loop<S: JobStore + 'static>(
    executor: Arc<JobExecutor<S>>,
    config: JobExecutorConfig,
    mut shutdown_rx: watch::Receiver<bool>,
    stats: SharedStats,
) {
    info!(executor = %config.name, "job executor started");
    let start_time = Instant::now();
    let permits = Arc::new(Semaphore::new(config.max_concurrent.max(1)));

    loop {
        if *shutdown_rx.borrow() {
            break;
        }
        with_stats(&stats, |s| s.uptime_secs = start_time.elapsed().as_secs());

        let permit = tokio::select! {
            permit = permits.clone().acquire_owned() => match permit {
                Ok(p) => p,
                Err(_) => break,
            },
            _ = shutdown_rx.changed() => break,
        };

        match executor.store.claim_next() {
            Ok(Some(mut job)) => {
                debug!(executor = %config.name, job_id = %job.id, kind = %job.kind, "claimed job");
                with_stats(&stats, |s| s.current_running += 1);

                let executor = executor.clone();
                let stats = stats.clone();
                tokio::spawn(async move {
                    let execution = executor.execute(&mut job).await;
                    with_stats(&stats, |s| {
                        s.current_running = s.current_running.saturating_sub(1);
                        s.jobs_processed += 1;
                        match execution {
                            Execution::Completed => s.jobs_succeeded += 1,
                            Execution::Discarded(_) => s.jobs_discarded += 1,
                            Execution::Retrying(_) => s.jobs_failed += 1,
                            Execution::DeadLettered(_) => {
                                s.jobs_failed += 1;
                                s.jobs_dead_lettered += 1;
                            }
                        }
                    });
                    drop(permit);
                });
            }
            Ok(None) => {
                drop(permit);
                idle(&mut shutdown_rx, config.poll_interval).await;
            }
            Err(e) => {
                drop(permit);
                error!(executor = %config.name, error = %e, "failed to claim job");
                idle(&mut shutdown_rx, config.poll_interval).await;
            }
        }
    }

    info!(executor = %config.name, "job executor stopped");
}

async fn idle(shutdown_rx: &mut watch::Receiver<bool>, interval: Duration) {
    tokio::select! {
        _ = tokio::time::sleep(interval) => {}
        _ = shutdown_rx.changed() => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::store::InMemoryJobStore;
    use crate::jobs::types::RetryPolicy;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed(JobResult);

    #[async_trait]
    impl JobHandler for Fixed {
        async fn handle(&self, _job: &Job) -> JobResult {
            self.0.clone()
        }
    }

    struct Counting(Arc<AtomicUsize>);

    #[async_trait]
    impl JobHandler for Counting {
        async fn handle(&self, _job: &Job) -> JobResult {
            self.0.fetch_add(1, Ordering::SeqCst);
            JobResult::Success
        }
    }

    fn cleanup_job() -> Job {
        Job::new(JobKind::MaterialCleanup, serde_json::json!({}))
    }

    async fn run_next<S: JobStore + 'static>(executor: &JobExecutor<S>) -> Option<(Job, Execution)> {
        let mut job = executor.store.claim_next().unwrap()?;
        let execution = executor.execute(&mut job).await;
        Some((job, execution))
    }

    #[tokio::test]
    async fn execute_successful_job() {
        let store = InMemoryJobStore::arc();
        let executor = JobExecutor::new(store.clone())
            .with_handler(JobKind::MaterialCleanup, Arc::new(Fixed(JobResult::Success)));

        store.enqueue(cleanup_job()).unwrap();

        let (job, execution) = run_next(&executor).await.unwrap();
        assert_eq!(execution, Execution::Completed);
        assert!(matches!(job.status, JobStatus::Completed));
        assert!(store.get(job.id).unwrap().is_none());
        assert_eq!(store.stats().unwrap().completed, 1);
    }

    #[tokio::test]
    async fn discarded_job_is_completed_without_retry() {
        let store = InMemoryJobStore::arc();
        let executor = JobExecutor::new(store.clone()).with_handler(
            JobKind::MaterialCleanup,
            Arc::new(Fixed(JobResult::Discarded("gone".into()))),
        );

        store.enqueue(cleanup_job()).unwrap();

        let (job, execution) = run_next(&executor).await.unwrap();
        assert_eq!(execution, Execution::Discarded("gone".into()));
        assert!(job.status.is_terminal());
        assert!(run_next(&executor).await.is_none());
    }

    #[tokio::test]
    async fn failing_job_retries_then_dead_letters() {
        let store = InMemoryJobStore::arc();
        let executor = JobExecutor::new(store.clone()).with_handler(
            JobKind::MaterialCleanup,
            Arc::new(Fixed(JobResult::Failure("test error".into()))),
        );

        let job = cleanup_job().with_retry_policy(RetryPolicy::fixed(2, Duration::ZERO));
        let job_id = job.id;
        store.enqueue(job).unwrap();

        let (_, first) = run_next(&executor).await.unwrap();
        assert_eq!(first, Execution::Retrying("test error".into()));

        let (_, second) = run_next(&executor).await.unwrap();
        assert_eq!(second, Execution::DeadLettered("test error".into()));

        assert!(store.get(job_id).unwrap().is_none());
        assert_eq!(store.stats().unwrap().dead_lettered, 1);
    }

    #[tokio::test]
    async fn missing_handler_fails_the_job() {
        let store = InMemoryJobStore::arc();
        let executor = JobExecutor::new(store.clone());

        store
            .enqueue(cleanup_job().with_retry_policy(RetryPolicy::no_retry()))
            .unwrap();

        let (_, execution) = run_next(&executor).await.unwrap();
        assert!(matches!(execution, Execution::DeadLettered(ref e) if e.contains("material.cleanup")));
    }

    #[tokio::test]
    async fn spawned_loop_drains_queue_and_shuts_down() {
        let store = InMemoryJobStore::arc();
        let runs = Arc::new(AtomicUsize::new(0));
        let executor = JobExecutor::new(store.clone())
            .with_handler(JobKind::MaterialCleanup, Arc::new(Counting(runs.clone())));

        for _ in 0..3 {
            store.enqueue(cleanup_job()).unwrap();
        }

        let handle = executor.spawn(
            JobExecutorConfig::default()
                .with_name("test")
                .with_poll_interval(Duration::from_millis(5)),
        );

        for _ in 0..200 {
            if handle.stats().jobs_processed == 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert_eq!(runs.load(Ordering::SeqCst), 3);
        assert_eq!(handle.stats().jobs_succeeded, 3);
        handle.shutdown().await;

        assert!(store.is_empty().unwrap());
        assert_eq!(store.stats().unwrap().completed, 3);
    }
}
