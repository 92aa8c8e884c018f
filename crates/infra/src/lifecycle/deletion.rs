//! Material deletion.

use std::sync::Arc;

use tracing::{info, warn};

use studyhub_auth::{authorize_owner, Principal};
use studyhub_core::{MaterialId, QuizId};
use studyhub_courses::pregenerated_quiz_title;
use studyhub_observability::{observe_async, LifecycleObserver};

use crate::jobs::{submit, JobId, JobKind, MaterialCleanupPayload, TaskQueue};
use crate::store::ResourceStore;

use super::{LifecycleError, LifecycleResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionReceipt {
    pub material_id: MaterialId,
    pub deleted_quiz_ids: Vec<QuizId>,
    /// `None` when the cleanup job could not be submitted.
    pub cleanup_job: Option<JobId>,
}

/// Deletes a material together with its quiz, then hands blob cleanup to the
/// queue. A failed submission is logged and otherwise ignored: the caller has
/// already lost nothing it can act on.
pub struct DeletionCoordinator {
    store: Arc<dyn ResourceStore>,
    queue: Arc<dyn TaskQueue>,
    observer: Arc<dyn LifecycleObserver>,
}

impl DeletionCoordinator {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        queue: Arc<dyn TaskQueue>,
        observer: Arc<dyn LifecycleObserver>,
    ) -> Self {
        Self { store, queue, observer }
    }

    pub async fn delete_material(&self, principal: &Principal, material_id: MaterialId) -> LifecycleResult<DeletionReceipt> {
        let owned = self.store.get_material(material_id).await?;
        let owned = authorize_owner(principal, owned)?;

        let quiz_title = pregenerated_quiz_title(&owned.material.file_name);
        let deleted = observe_async(
            self.observer.as_ref(),
            "material.delete_cascade",
            self.store.delete_material_cascade(material_id, &quiz_title),
        )
        .await?
        // Lost a race with a concurrent delete.
        .ok_or(LifecycleError::NotFound)?;

        info!(
            course_id = %deleted.material.course_id,
            material_id = %material_id,
            deleted_quizzes = deleted.deleted_quiz_ids.len(),
            "material deleted"
        );

        let payload = MaterialCleanupPayload {
            course_id: deleted.material.course_id,
            material_id,
            quiz_title,
            material_file_url: deleted.material.material_file_url.clone(),
        };
        let cleanup_job = match observe_async(
            self.observer.as_ref(),
            "material.enqueue_cleanup",
            submit(self.queue.as_ref(), JobKind::MaterialCleanup, &payload),
        )
        .await
        {
            Ok(job_id) => Some(job_id),
            Err(e) => {
                warn!(
                    material_id = %material_id,
                    material_file_url = %payload.material_file_url,
                    error = %e,
                    "cleanup job could not be submitted; blob left in storage"
                );
                None
            }
        };

        Ok(DeletionReceipt {
            material_id,
            deleted_quiz_ids: deleted.deleted_quiz_ids,
            cleanup_job,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{InMemoryJobStore, JobStore, JobStoreQueue};
    use crate::lifecycle::QuizPregenerator;
    use crate::store::InMemoryResourceStore;
    use studyhub_core::{CourseId, UserId};
    use studyhub_courses::{NewCourse, NewMaterial};
    use studyhub_observability::TracingObserver;

    struct Fixture {
        store: Arc<InMemoryResourceStore>,
        queue: Arc<JobStoreQueue<Arc<InMemoryJobStore>>>,
        pregenerator: QuizPregenerator,
        coordinator: DeletionCoordinator,
        owner: Principal,
        course_id: CourseId,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(InMemoryResourceStore::new());
        let queue = Arc::new(JobStoreQueue::new(InMemoryJobStore::arc()));
        let observer = Arc::new(TracingObserver);

        let owner = Principal::new(UserId::new());
        let course = store
            .create_course(owner.user_id, NewCourse::new("Test Course", "TEST", 5).unwrap())
            .await
            .unwrap();

        Fixture {
            pregenerator: QuizPregenerator::new(store.clone(), queue.clone(), observer.clone()),
            coordinator: DeletionCoordinator::new(store.clone(), queue.clone(), observer),
            store,
            queue,
            owner,
            course_id: course.id,
        }
    }

    async fn upload(f: &Fixture) -> MaterialId {
        let new = NewMaterial::new("2025-06-05T08:55:05_Concurrency", "test_material.pdf", "application/pdf", 2048)
            .unwrap();
        f.pregenerator.create_material(&f.owner, f.course_id, new).await.unwrap().material.id
    }

    #[tokio::test]
    async fn delete_removes_material_and_quiz_then_enqueues_cleanup() {
        let f = fixture().await;
        let material_id = upload(&f).await;

        let receipt = f.coordinator.delete_material(&f.owner, material_id).await.unwrap();

        assert_eq!(receipt.deleted_quiz_ids.len(), 1);
        assert!(f.store.list_materials(f.course_id).await.unwrap().is_empty());
        assert!(f.store.list_quizzes(f.course_id).await.unwrap().is_empty());

        let jobs = f.queue.store().list_by_kind(JobKind::MaterialCleanup, 10).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(Some(jobs[0].id), receipt.cleanup_job);
        let payload: MaterialCleanupPayload = jobs[0].payload_as().unwrap();
        assert_eq!(payload.material_file_url, "2025-06-05T08:55:05_Concurrency");
        assert_eq!(payload.quiz_title, "pregenerated-quiz-test_material.pdf");
        assert_eq!(payload.course_id, f.course_id);
    }

    #[tokio::test]
    async fn stranger_cannot_delete() {
        let f = fixture().await;
        let material_id = upload(&f).await;
        let stranger = Principal::new(UserId::new());

        let err = f.coordinator.delete_material(&stranger, material_id).await.unwrap_err();
        assert_eq!(err, LifecycleError::NotFound);
        assert_eq!(f.store.list_materials(f.course_id).await.unwrap().len(), 1);
        assert!(f.queue.store().list_by_kind(JobKind::MaterialCleanup, 10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_material_is_not_found() {
        let f = fixture().await;
        let err = f.coordinator.delete_material(&f.owner, MaterialId::new()).await.unwrap_err();
        assert_eq!(err, LifecycleError::NotFound);
    }

    #[tokio::test]
    async fn rejected_cleanup_still_deletes() {
        let f = fixture().await;
        let material_id = upload(&f).await;
        f.queue.set_accepting(false);

        let receipt = f.coordinator.delete_material(&f.owner, material_id).await.unwrap();

        assert!(receipt.cleanup_job.is_none());
        assert!(f.store.get_material(material_id).await.unwrap().is_none());
        assert!(f.store.list_quizzes(f.course_id).await.unwrap().is_empty());
    }
}
