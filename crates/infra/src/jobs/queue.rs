//! Producer side of the deferred task queue.
//!
//! Orchestrators only ever submit work; they never wait for it. Acceptance by
//! the queue is the whole contract.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::Serialize;

use super::store::JobStore;
use super::types::{Job, JobId, JobKind, RetryPolicy};

#[derive(Debug, thiserror::Error)]
pub enum EnqueueError {
    /// The broker refused or could not be reached.
    #[error("task queue rejected the job: {0}")]
    Rejected(String),
    #[error("failed to encode job payload: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn enqueue(&self, kind: JobKind, payload: serde_json::Value) -> Result<JobId, EnqueueError>;
}

#[async_trait]
impl<Q: TaskQueue + ?Sized> TaskQueue for Arc<Q> {
    async fn enqueue(&self, kind: JobKind, payload: serde_json::Value) -> Result<JobId, EnqueueError> {
        (**self).enqueue(kind, payload).await
    }
}

/// Encode a typed payload and submit it.
pub async fn submit<P: Serialize + Sync>(
    queue: &dyn TaskQueue,
    kind: JobKind,
    payload: &P,
) -> Result<JobId, EnqueueError> {
    let value = serde_json::to_value(payload)?;
    queue.enqueue(kind, value).await
}

/// Queue backed by a local [`JobStore`], consumed by the in-process executor.
pub struct JobStoreQueue<S: JobStore> {
    store: S,
    retry_policy: RetryPolicy,
    accepting: AtomicBool,
}

impl<S: JobStore> JobStoreQueue<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            retry_policy: RetryPolicy::default(),
            accepting: AtomicBool::new(true),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// While closed every submission is rejected, like an unreachable broker.
    pub fn set_accepting(&self, accepting: bool) {
        self.accepting.store(accepting, Ordering::SeqCst);
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

#[async_trait]
impl<S: JobStore> TaskQueue for JobStoreQueue<S> {
    async fn enqueue(&self, kind: JobKind, payload: serde_json::Value) -> Result<JobId, EnqueueError> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(EnqueueError::Rejected("queue is not accepting jobs".to_string()));
        }

        let job = Job::new(kind, payload).with_retry_policy(self.retry_policy.clone());
        self.store
            .enqueue(job)
            .map_err(|e| EnqueueError::Rejected(e.to_string()))
    }
}

#[cfg(feature = "redis")]
pub use redis_queue::RedisTaskQueue;

#[cfg(feature = "redis")]
mod redis_queue {
    use super::*;
    use tracing::instrument;

    const DEFAULT_STREAM_KEY: &str = "studyhub:jobs";

    /// Publishes jobs to a Redis stream for an external worker fleet.
    #[derive(Debug, Clone)]
    pub struct RedisTaskQueue {
        client: Arc<redis::Client>,
        stream_key: String,
    }

    impl RedisTaskQueue {
        pub fn new(redis_url: impl AsRef<str>, stream_key: Option<String>) -> Result<Self, EnqueueError> {
            let client = redis::Client::open(redis_url.as_ref())
                .map_err(|e| EnqueueError::Rejected(e.to_string()))?;

            Ok(Self {
                client: Arc::new(client),
                stream_key: stream_key.unwrap_or_else(|| DEFAULT_STREAM_KEY.to_string()),
            })
        }

        #[instrument(skip(self, job), fields(stream_key = %self.stream_key, job_id = %job.id, kind = %job.kind), err)]
        fn publish_sync(&self, job: &Job) -> Result<(), EnqueueError> {
            let payload = serde_json::to_string(&job.payload)?;

            let mut conn = self
                .client
                .get_connection()
                .map_err(|e| EnqueueError::Rejected(e.to_string()))?;

            let _: String = redis::cmd("XADD")
                .arg(&self.stream_key)
                .arg("*")
                .arg("job_id")
                .arg(job.id.to_string())
                .arg("kind")
                .arg(job.kind.name())
                .arg("max_attempts")
                .arg(job.retry_policy.max_attempts)
                .arg("payload")
                .arg(&payload)
                .query(&mut conn)
                .map_err(|e| EnqueueError::Rejected(e.to_string()))?;

            Ok(())
        }
    }

    #[async_trait]
    impl TaskQueue for RedisTaskQueue {
        async fn enqueue(&self, kind: JobKind, payload: serde_json::Value) -> Result<JobId, EnqueueError> {
            let job = Job::new(kind, payload);
            let id = job.id;
            let this = self.clone();

            tokio::task::spawn_blocking(move || this.publish_sync(&job))
                .await
                .map_err(|e| EnqueueError::Rejected(e.to_string()))??;

            Ok(id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::store::InMemoryJobStore;
    use crate::jobs::types::MaterialCleanupPayload;
    use studyhub_core::{CourseId, MaterialId};

    #[tokio::test]
    async fn submit_stores_typed_payload() {
        let queue = JobStoreQueue::new(InMemoryJobStore::arc());
        let payload = MaterialCleanupPayload {
            course_id: CourseId::new(),
            material_id: MaterialId::new(),
            quiz_title: "pregenerated-quiz-a.pdf".into(),
            material_file_url: "2025-06-05T08:55:05_Concurrency".into(),
        };

        let id = submit(&queue, JobKind::MaterialCleanup, &payload).await.unwrap();

        let job = queue.store().get(id).unwrap().unwrap();
        assert_eq!(job.kind, JobKind::MaterialCleanup);
        assert_eq!(job.payload_as::<MaterialCleanupPayload>().unwrap(), payload);
    }

    #[tokio::test]
    async fn closed_queue_rejects() {
        let queue = JobStoreQueue::new(InMemoryJobStore::arc());
        queue.set_accepting(false);

        let err = queue
            .enqueue(JobKind::QuestionGeneration, serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, EnqueueError::Rejected(_)));
        assert_eq!(queue.store().stats().unwrap().pending, 0);

        queue.set_accepting(true);
        assert!(queue.enqueue(JobKind::QuestionGeneration, serde_json::json!({})).await.is_ok());
    }

    #[tokio::test]
    async fn retry_policy_is_stamped_on_jobs() {
        let queue = JobStoreQueue::new(InMemoryJobStore::arc())
            .with_retry_policy(RetryPolicy::default().with_max_attempts(3));

        let id = queue.enqueue(JobKind::MaterialCleanup, serde_json::json!({})).await.unwrap();
        assert_eq!(queue.store().get(id).unwrap().unwrap().retry_policy.max_attempts, 3);
    }
}
