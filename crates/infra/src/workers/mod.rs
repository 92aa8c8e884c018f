//! Job handlers for the deferred work submitted by the lifecycle
//! orchestrators, and the wiring that runs them.

pub mod cleanup;
pub mod generation;

use std::sync::Arc;

pub use cleanup::MaterialCleanupWorker;
pub use generation::QuestionGenerationWorker;

use crate::external::{ObjectStorage, QuestionGenerator};
use crate::jobs::{JobExecutor, JobExecutorConfig, JobExecutorHandle, JobKind, JobStore};
use crate::store::ResourceStore;

/// Register both workers on an executor over `jobs` and start it.
pub fn spawn_workers<S: JobStore + 'static>(
    jobs: S,
    store: Arc<dyn ResourceStore>,
    generator: Arc<dyn QuestionGenerator>,
    storage: Arc<dyn ObjectStorage>,
    config: JobExecutorConfig,
) -> JobExecutorHandle {
    JobExecutor::new(jobs)
        .with_handler(
            JobKind::QuestionGeneration,
            Arc::new(QuestionGenerationWorker::new(store.clone(), generator)),
        )
        .with_handler(JobKind::MaterialCleanup, Arc::new(MaterialCleanupWorker::new(store, storage)))
        .spawn(config)
}
