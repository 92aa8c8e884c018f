//! Job storage.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::types::{Job, JobId, JobKind, JobStatus};

/// Job store abstraction.
///
/// Only live jobs (pending, running, waiting for a retry) are held. Finished
/// and dead-lettered jobs leave the store and are only counted.
pub trait JobStore: Send + Sync {
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError>;

    fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError>;

    fn update(&self, job: &Job) -> Result<(), JobStoreError>;

    /// Claim the oldest pending (or retry-due) job and mark it running.
    fn claim_next(&self) -> Result<Option<Job>, JobStoreError>;

    /// Live jobs of one kind, oldest first.
    fn list_by_kind(&self, kind: JobKind, limit: usize) -> Result<Vec<Job>, JobStoreError>;

    /// Drop a job that ran to completion.
    fn complete(&self, job: &Job) -> Result<(), JobStoreError>;

    /// Drop a job that exhausted its attempts.
    fn dead_letter(&self, job: &Job) -> Result<(), JobStoreError>;

    fn stats(&self) -> Result<JobStats, JobStoreError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("job already exists: {0}")]
    AlreadyExists(JobId),
    #[error("storage error: {0}")]
    Storage(String),
}

/// `completed` and `dead_lettered` are running totals since start-up.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct JobStats {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub dead_lettered: usize,
}

/// In-process job store.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
    completed: AtomicUsize,
    dead_lettered: AtomicUsize,
}

fn poisoned<T>(_: T) -> JobStoreError {
    JobStoreError::Storage("job store lock poisoned".to_string())
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Number of jobs currently held.
    pub fn len(&self) -> Result<usize, JobStoreError> {
        Ok(self.jobs()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, JobStoreError> {
        Ok(self.len()? == 0)
    }

    fn jobs(&self) -> Result<RwLockReadGuard<'_, HashMap<JobId, Job>>, JobStoreError> {
        self.jobs.read().map_err(poisoned)
    }

    fn jobs_mut(&self) -> Result<RwLockWriteGuard<'_, HashMap<JobId, Job>>, JobStoreError> {
        self.jobs.write().map_err(poisoned)
    }

    fn remove(&self, job_id: JobId, counter: &AtomicUsize) -> Result<(), JobStoreError> {
        match self.jobs_mut()?.remove(&job_id) {
            Some(_) => {
                counter.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            None => Err(JobStoreError::NotFound(job_id)),
        }
    }
}

impl JobStore for InMemoryJobStore {
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError> {
        let mut jobs = self.jobs_mut()?;
        if jobs.contains_key(&job.id) {
            return Err(JobStoreError::AlreadyExists(job.id));
        }
        let id = job.id;
        jobs.insert(id, job);
        Ok(id)
    }

    fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        Ok(self.jobs()?.get(&job_id).cloned())
    }

    fn update(&self, job: &Job) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs_mut()?;
        match jobs.get_mut(&job.id) {
            Some(slot) => {
                *slot = job.clone();
                Ok(())
            }
            None => Err(JobStoreError::NotFound(job.id)),
        }
    }

    fn claim_next(&self) -> Result<Option<Job>, JobStoreError> {
        let mut jobs = self.jobs_mut()?;

        // FIFO over everything that is due.
        let next = jobs
            .values()
            .filter(|j| matches!(j.status, JobStatus::Pending | JobStatus::Failed { .. }) && j.is_ready())
            .min_by_key(|j| (j.created_at, j.id.0))
            .map(|j| j.id);

        Ok(next.and_then(|id| {
            jobs.get_mut(&id).map(|job| {
                job.mark_running();
                job.clone()
            })
        }))
    }

    fn list_by_kind(&self, kind: JobKind, limit: usize) -> Result<Vec<Job>, JobStoreError> {
        let jobs = self.jobs()?;
        let mut result: Vec<_> = jobs.values().filter(|j| j.kind == kind).cloned().collect();

        result.sort_by_key(|j| (j.created_at, j.id.0));
        result.truncate(limit);
        Ok(result)
    }

    fn complete(&self, job: &Job) -> Result<(), JobStoreError> {
        self.remove(job.id, &self.completed)
    }

    fn dead_letter(&self, job: &Job) -> Result<(), JobStoreError> {
        self.remove(job.id, &self.dead_lettered)
    }

    fn stats(&self) -> Result<JobStats, JobStoreError> {
        let jobs = self.jobs()?;

        let mut stats = JobStats {
            completed: self.completed.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
            ..JobStats::default()
        };

        for job in jobs.values() {
            match &job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Failed { .. } => stats.failed += 1,
                // Terminal jobs are removed on the way out.
                JobStatus::Completed | JobStatus::DeadLettered { .. } => {}
            }
        }

        Ok(stats)
    }
}

impl<S: JobStore + ?Sized> JobStore for Arc<S> {
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError> {
        (**self).enqueue(job)
    }

    fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        (**self).get(job_id)
    }

    fn update(&self, job: &Job) -> Result<(), JobStoreError> {
        (**self).update(job)
    }

    fn claim_next(&self) -> Result<Option<Job>, JobStoreError> {
        (**self).claim_next()
    }

    fn list_by_kind(&self, kind: JobKind, limit: usize) -> Result<Vec<Job>, JobStoreError> {
        (**self).list_by_kind(kind, limit)
    }

    fn complete(&self, job: &Job) -> Result<(), JobStoreError> {
        (**self).complete(job)
    }

    fn dead_letter(&self, job: &Job) -> Result<(), JobStoreError> {
        (**self).dead_letter(job)
    }

    fn stats(&self) -> Result<JobStats, JobStoreError> {
        (**self).stats()
    }
}
