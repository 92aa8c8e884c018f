use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::external::ObjectStorage;
use crate::jobs::{Job, JobHandler, JobResult, MaterialCleanupPayload};
use crate::store::ResourceStore;

/// Removes a deleted material's blob and any quiz left behind under its
/// derived title. Failures are retried by the executor and never reach users.
pub struct MaterialCleanupWorker {
    store: Arc<dyn ResourceStore>,
    storage: Arc<dyn ObjectStorage>,
}

impl MaterialCleanupWorker {
    pub fn new(store: Arc<dyn ResourceStore>, storage: Arc<dyn ObjectStorage>) -> Self {
        Self { store, storage }
    }
}

#[async_trait]
impl JobHandler for MaterialCleanupWorker {
    async fn handle(&self, job: &Job) -> JobResult {
        let payload: MaterialCleanupPayload = match job.payload_as() {
            Ok(p) => p,
            Err(e) => return JobResult::Discarded(format!("malformed payload: {e}")),
        };

        if let Err(e) = self.storage.remove(&payload.material_file_url).await {
            return JobResult::Failure(format!("blob removal failed: {e}"));
        }

        match self
            .store
            .delete_quizzes_by_title(payload.course_id, &payload.quiz_title)
            .await
        {
            Ok(deleted) => {
                info!(
                    job_id = %job.id,
                    material_id = %payload.material_id,
                    material_file_url = %payload.material_file_url,
                    leftover_quizzes = deleted.len(),
                    "material cleanup finished"
                );
                JobResult::Success
            }
            Err(e) => JobResult::Failure(format!("quiz cleanup failed: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::{ExternalError, InMemoryObjectStorage};
    use crate::jobs::JobKind;
    use crate::store::InMemoryResourceStore;
    use studyhub_core::{MaterialId, UserId};
    use studyhub_courses::{pregenerated_quiz_title, NewCourse, NewQuiz, DEFAULT_QUESTION_COUNT};

    fn job_for(payload: &MaterialCleanupPayload) -> Job {
        Job::new(JobKind::MaterialCleanup, serde_json::to_value(payload).unwrap())
    }

    #[tokio::test]
    async fn removes_blob_and_leftover_quiz() {
        let store = Arc::new(InMemoryResourceStore::new());
        let storage = Arc::new(InMemoryObjectStorage::new());
        let course = store
            .create_course(UserId::new(), NewCourse::new("Test Course", "TEST", 5).unwrap())
            .await
            .unwrap();
        let title = pregenerated_quiz_title("test_material.pdf");
        store
            .create_quiz(NewQuiz {
                course_id: course.id,
                quiz_title: title.clone(),
                is_generated: true,
                number_of_questions: DEFAULT_QUESTION_COUNT,
                source_material_id: None,
            })
            .await
            .unwrap();

        let worker = MaterialCleanupWorker::new(store.clone(), storage.clone());
        let payload = MaterialCleanupPayload {
            course_id: course.id,
            material_id: MaterialId::new(),
            quiz_title: title,
            material_file_url: "2025-06-05T08:55:05_Concurrency".into(),
        };

        assert_eq!(worker.handle(&job_for(&payload)).await, JobResult::Success);
        assert_eq!(storage.removed(), vec!["2025-06-05T08:55:05_Concurrency".to_string()]);
        assert!(store.list_quizzes(course.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn storage_failure_is_retryable() {
        let store = Arc::new(InMemoryResourceStore::new());
        let storage = Arc::new(InMemoryObjectStorage::new());
        storage.fail_with(Some(ExternalError::Api {
            status: 503,
            body: "unavailable".into(),
        }));

        let worker = MaterialCleanupWorker::new(store, storage);
        let payload = MaterialCleanupPayload {
            course_id: studyhub_core::CourseId::new(),
            material_id: MaterialId::new(),
            quiz_title: "pregenerated-quiz-a.pdf".into(),
            material_file_url: "ref".into(),
        };

        assert!(matches!(worker.handle(&job_for(&payload)).await, JobResult::Failure(_)));
    }
}
