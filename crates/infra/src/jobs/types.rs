//! Core job types and policies.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use studyhub_core::{CourseId, MaterialId, QuizId};

/// Unique job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The bounded set of deferred jobs this system submits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Fill a placeholder quiz with generated questions.
    QuestionGeneration,
    /// Remove a deleted material's blob and any leftover quiz.
    MaterialCleanup,
}

impl JobKind {
    /// Wire name used by external brokers.
    pub fn name(&self) -> &'static str {
        match self {
            JobKind::QuestionGeneration => "quiz.generate_questions",
            JobKind::MaterialCleanup => "material.cleanup",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Payload of [`JobKind::QuestionGeneration`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateQuestionsPayload {
    pub quiz_id: QuizId,
    pub number_of_questions: u32,
}

/// Payload of [`JobKind::MaterialCleanup`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialCleanupPayload {
    pub course_id: CourseId,
    pub material_id: MaterialId,
    pub quiz_title: String,
    pub material_file_url: String,
}

/// Job execution status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Queued, waiting to be picked up
    Pending,
    /// Currently being executed
    Running,
    Completed,
    /// Failed, will be retried
    Failed { error: String, attempt: u32 },
    /// Exhausted retries, moved to DLQ
    DeadLettered { error: String, attempts: u32 },
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::DeadLettered { .. })
    }
}

/// Backoff strategy for retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed,
    /// Exponential backoff: base * 2^attempt
    #[default]
    Exponential,
}

/// Retry policy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts allowed, the first one included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub strategy: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
            strategy: BackoffStrategy::Exponential,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            max_delay: delay,
            strategy: BackoffStrategy::Fixed,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Delay before the retry following `attempt` (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        match self.strategy {
            BackoffStrategy::Fixed => self.base_delay,
            BackoffStrategy::Exponential => {
                let factor = 2u32.saturating_pow(attempt - 1);
                self.base_delay.saturating_mul(factor).min(self.max_delay)
            }
        }
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// A deferred job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub payload: serde_json::Value,
    pub status: JobStatus,
    pub retry_policy: RetryPolicy,
    /// Attempts started so far.
    pub attempt: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Not claimable before this instant (retry backoff).
    pub scheduled_at: Option<DateTime<Utc>>,
    pub history: Vec<JobAttemptRecord>,
}

/// Record of a job execution attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobAttemptRecord {
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl Job {
    pub fn new(kind: JobKind, payload: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            kind,
            payload,
            status: JobStatus::Pending,
            retry_policy: RetryPolicy::default(),
            attempt: 0,
            created_at: now,
            updated_at: now,
            scheduled_at: None,
            history: Vec::new(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Decode the payload into its typed form.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }

    pub fn is_ready(&self) -> bool {
        match self.scheduled_at {
            Some(at) => Utc::now() >= at,
            None => true,
        }
    }

    /// True while running the last attempt the retry policy allows.
    pub fn is_final_attempt(&self) -> bool {
        !self.retry_policy.should_retry(self.attempt)
    }

    pub fn mark_running(&mut self) {
        self.status = JobStatus::Running;
        self.attempt += 1;
        self.updated_at = Utc::now();
    }

    pub fn mark_completed(&mut self, started_at: DateTime<Utc>) {
        let now = Utc::now();
        self.status = JobStatus::Completed;
        self.updated_at = now;
        self.scheduled_at = None;
        self.push_history(started_at, now, None);
    }

    pub fn mark_failed(&mut self, error: String, started_at: DateTime<Utc>) {
        let now = Utc::now();
        self.updated_at = now;
        self.push_history(started_at, now, Some(error.clone()));

        if self.retry_policy.should_retry(self.attempt) {
            let delay = self.retry_policy.delay_for_attempt(self.attempt);
            self.scheduled_at = Some(now + chrono::Duration::from_std(delay).unwrap_or_default());
            self.status = JobStatus::Failed {
                error,
                attempt: self.attempt,
            };
        } else {
            self.status = JobStatus::DeadLettered {
                error,
                attempts: self.attempt,
            };
        }
    }

    fn push_history(&mut self, started_at: DateTime<Utc>, finished_at: DateTime<Utc>, error: Option<String>) {
        self.history.push(JobAttemptRecord {
            attempt: self.attempt,
            started_at,
            finished_at,
            success: error.is_none(),
            error,
            duration_ms: (finished_at - started_at).num_milliseconds().max(0) as u64,
        });
    }
}

/// Outcome reported by a job handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobResult {
    Success,
    /// Nothing left to do (e.g. the target record is gone). Completes the job.
    Discarded(String),
    /// Retried according to the job's policy, then dead-lettered.
    Failure(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_backoff_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(300),
            strategy: BackoffStrategy::Exponential,
        };

        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(300));
        assert_eq!(policy.delay_for_attempt(30), Duration::from_millis(300));
    }

    #[test]
    fn fixed_backoff_is_constant() {
        let policy = RetryPolicy::fixed(3, Duration::from_millis(500));

        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(500));
    }

    #[test]
    fn job_lifecycle() {
        let mut job = Job::new(
            JobKind::MaterialCleanup,
            serde_json::json!({"key": "value"}),
        );

        assert!(matches!(job.status, JobStatus::Pending));
        assert_eq!(job.attempt, 0);

        job.mark_running();
        assert!(matches!(job.status, JobStatus::Running));
        assert_eq!(job.attempt, 1);

        job.mark_completed(Utc::now());
        assert!(job.status.is_terminal());
        assert_eq!(job.history.len(), 1);
        assert!(job.history[0].success);
    }

    #[test]
    fn failure_retries_then_dead_letters() {
        let mut job = Job::new(JobKind::QuestionGeneration, serde_json::json!({}))
            .with_retry_policy(RetryPolicy::default().with_max_attempts(2));

        job.mark_running();
        assert!(!job.is_final_attempt());
        job.mark_failed("error 1".to_string(), Utc::now());
        assert!(matches!(job.status, JobStatus::Failed { .. }));
        assert!(job.scheduled_at.is_some());

        job.mark_running();
        assert!(job.is_final_attempt());
        job.mark_failed("error 2".to_string(), Utc::now());
        assert!(matches!(job.status, JobStatus::DeadLettered { attempts: 2, .. }));
    }

    #[test]
    fn payload_decodes_to_typed_form() {
        let payload = GenerateQuestionsPayload {
            quiz_id: QuizId::new(),
            number_of_questions: 20,
        };
        let job = Job::new(
            JobKind::QuestionGeneration,
            serde_json::to_value(&payload).unwrap(),
        );
        assert_eq!(job.payload_as::<GenerateQuestionsPayload>().unwrap(), payload);
        assert!(job.payload_as::<MaterialCleanupPayload>().is_err());
    }
}
