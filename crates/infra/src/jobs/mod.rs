//! Deferred jobs: question generation and post-deletion cleanup.
//!
//! - `TaskQueue`: what orchestrators submit to (fire-and-forget)
//! - `JobStore`: persistence for the in-process queue
//! - `JobExecutor`: runs due jobs with retry and backoff, dropping finished and exhausted ones

pub mod executor;
pub mod queue;
pub mod store;
pub mod types;

pub use executor::{Execution, ExecutorStats, JobExecutor, JobExecutorConfig, JobExecutorHandle, JobHandler};
#[cfg(feature = "redis")]
pub use queue::RedisTaskQueue;
pub use queue::{submit, EnqueueError, JobStoreQueue, TaskQueue};
pub use store::{InMemoryJobStore, JobStats, JobStore, JobStoreError};
pub use types::{
    BackoffStrategy, GenerateQuestionsPayload, Job, JobId, JobKind, JobResult,
    JobStatus, MaterialCleanupPayload, RetryPolicy,
};
