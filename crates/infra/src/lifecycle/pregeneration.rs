//! Quiz pregeneration on material upload.

use std::sync::Arc;

use tracing::{info, warn};

use studyhub_auth::{authorize_owner, Principal};
use studyhub_core::CourseId;
use studyhub_courses::{Material, NewMaterial, NewQuiz, Quiz};
use studyhub_observability::{observe_async, LifecycleObserver};

use crate::jobs::{submit, GenerateQuestionsPayload, JobId, JobKind, TaskQueue};
use crate::store::ResourceStore;

use super::{LifecycleError, LifecycleResult};

/// Records created by a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterialUpload {
    pub material: Material,
    pub quiz: Quiz,
    pub generation_job: JobId,
}

/// Creates the placeholder quiz for every new material and requests its
/// questions.
///
/// If the queue rejects the job, the caller gets a validation error but the
/// material and quiz stay persisted with the quiz still `pending`. A quiz that
/// cannot be linked to its material is removed again.
pub struct QuizPregenerator {
    store: Arc<dyn ResourceStore>,
    queue: Arc<dyn TaskQueue>,
    observer: Arc<dyn LifecycleObserver>,
}

impl QuizPregenerator {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        queue: Arc<dyn TaskQueue>,
        observer: Arc<dyn LifecycleObserver>,
    ) -> Self {
        Self { store, queue, observer }
    }

    /// Upload `new` into `course_id` on behalf of `principal`.
    pub async fn create_material(
        &self,
        principal: &Principal,
        course_id: CourseId,
        new: NewMaterial,
    ) -> LifecycleResult<MaterialUpload> {
        let course = self.store.get_course(course_id).await?;
        authorize_owner(principal, course)?;

        let material = observe_async(self.observer.as_ref(), "material.persist", self.store.create_material(course_id, new)).await?;
        info!(
            course_id = %course_id,
            material_id = %material.id,
            file_name = %material.file_name,
            "material created"
        );

        self.pregenerate(material).await
    }

    /// Create the placeholder quiz for an already persisted material and
    /// submit its generation job.
    pub async fn pregenerate(&self, material: Material) -> LifecycleResult<MaterialUpload> {
        let observer = self.observer.as_ref();

        let quiz = observe_async(observer, "quiz.create", self.store.create_quiz(NewQuiz::pregenerated(&material))).await?;
        let quiz = match observe_async(observer, "quiz.attach_material", self.store.attach_material(quiz.id, material.id)).await {
            Ok(quiz) => quiz,
            Err(e) => {
                warn!(
                    material_id = %material.id,
                    quiz_id = %quiz.id,
                    error = %e,
                    "linking pregenerated quiz failed; removing it"
                );
                // Only unlinked quizzes match, so the material's other quizzes survive.
                if let Err(cleanup) = self.store.delete_quizzes_by_title(material.course_id, &quiz.quiz_title).await {
                    warn!(quiz_id = %quiz.id, error = %cleanup, "unlinked quiz left behind");
                }
                return Err(e.into());
            }
        };

        let payload = GenerateQuestionsPayload {
            quiz_id: quiz.id,
            number_of_questions: quiz.number_of_questions,
        };
        let generation_job = observe_async(
            observer,
            "quiz.enqueue_generation",
            submit(self.queue.as_ref(), JobKind::QuestionGeneration, &payload),
        )
        .await
        .map_err(|e| {
            warn!(
                material_id = %material.id,
                quiz_id = %quiz.id,
                error = %e,
                "question generation could not be submitted; material and quiz are kept"
            );
            LifecycleError::Validation(format!("Error generating questions: {e}"))
        })?;

        info!(
            material_id = %material.id,
            quiz_id = %quiz.id,
            quiz_title = %quiz.quiz_title,
            job_id = %generation_job,
            "quiz pregeneration requested"
        );

        Ok(MaterialUpload {
            material,
            quiz,
            generation_job,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{InMemoryJobStore, JobStore, JobStoreQueue};
    use crate::store::{DeletedMaterial, InMemoryResourceStore, StoreError, StoreResult};
    use async_trait::async_trait;
    use studyhub_core::{MaterialId, QuizId, UserId};
    use studyhub_courses::{
        Course, CoursePatch, GenerationStatus, MaterialPatch, NewCourse, OwnedMaterial, OwnedQuiz, Question,
    };
    use studyhub_observability::InMemoryMetrics;

    struct Fixture {
        store: Arc<InMemoryResourceStore>,
        queue: Arc<JobStoreQueue<Arc<InMemoryJobStore>>>,
        metrics: Arc<InMemoryMetrics>,
        pregenerator: QuizPregenerator,
        owner: Principal,
        course_id: CourseId,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(InMemoryResourceStore::new());
        let queue = Arc::new(JobStoreQueue::new(InMemoryJobStore::arc()));
        let metrics = Arc::new(InMemoryMetrics::new());
        let pregenerator = QuizPregenerator::new(store.clone(), queue.clone(), metrics.clone());

        let owner = Principal::new(UserId::new());
        let course = store
            .create_course(owner.user_id, NewCourse::new("Test Course", "TEST", 5).unwrap())
            .await
            .unwrap();

        Fixture {
            store,
            queue,
            metrics,
            pregenerator,
            owner,
            course_id: course.id,
        }
    }

    fn upload() -> NewMaterial {
        NewMaterial::new("2025-06-05T08:55:05_Concurrency", "test_material.pdf", "application/pdf", 2048).unwrap()
    }

    #[tokio::test]
    async fn upload_creates_exactly_one_linked_quiz_and_job() {
        let f = fixture().await;

        let created = f.pregenerator.create_material(&f.owner, f.course_id, upload()).await.unwrap();

        let quizzes = f.store.list_quizzes(f.course_id).await.unwrap();
        assert_eq!(quizzes.len(), 1);
        let quiz = &quizzes[0];
        assert_eq!(quiz.quiz_title, "pregenerated-quiz-test_material.pdf");
        assert!(quiz.is_generated);
        assert_eq!(quiz.number_of_questions, 20);
        assert_eq!(quiz.material_ids, vec![created.material.id]);
        assert_eq!(quiz.generation_status, GenerationStatus::Pending);

        let jobs = f.queue.store().list_by_kind(JobKind::QuestionGeneration, 10).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, created.generation_job);
        let payload: GenerateQuestionsPayload = jobs[0].payload_as().unwrap();
        assert_eq!(payload.quiz_id, quiz.id);
        assert_eq!(payload.number_of_questions, 20);

        assert_eq!(f.metrics.step("quiz.enqueue_generation").succeeded, 1);
    }

    #[tokio::test]
    async fn foreign_course_is_not_found_and_creates_nothing() {
        let f = fixture().await;
        let stranger = Principal::new(UserId::new());

        let err = f.pregenerator.create_material(&stranger, f.course_id, upload()).await.unwrap_err();
        assert_eq!(err, LifecycleError::NotFound);

        let missing = f.pregenerator.create_material(&f.owner, CourseId::new(), upload()).await.unwrap_err();
        assert_eq!(missing, LifecycleError::NotFound);

        assert!(f.store.list_materials(f.course_id).await.unwrap().is_empty());
        assert!(f.store.list_quizzes(f.course_id).await.unwrap().is_empty());
        assert_eq!(f.queue.store().stats().unwrap().pending, 0);
    }

    #[tokio::test]
    async fn rejected_enqueue_keeps_material_and_quiz() {
        let f = fixture().await;
        f.queue.set_accepting(false);

        let err = f.pregenerator.create_material(&f.owner, f.course_id, upload()).await.unwrap_err();
        match err {
            LifecycleError::Validation(msg) => assert!(msg.starts_with("Error generating questions: ")),
            other => panic!("expected validation error, got {other:?}"),
        }

        assert_eq!(f.store.list_materials(f.course_id).await.unwrap().len(), 1);
        let quizzes = f.store.list_quizzes(f.course_id).await.unwrap();
        assert_eq!(quizzes.len(), 1);
        assert_eq!(quizzes[0].generation_status, GenerationStatus::Pending);
        assert_eq!(f.metrics.step("quiz.enqueue_generation").failed, 1);
    }

    /// Delegates to the in-memory store but refuses to link quizzes.
    struct UnlinkableStore(Arc<InMemoryResourceStore>);

    #[async_trait]
    impl ResourceStore for UnlinkableStore {
        async fn create_course(&self, owner_id: UserId, new: NewCourse) -> StoreResult<Course> {
            self.0.create_course(owner_id, new).await
        }

        async fn get_course(&self, id: CourseId) -> StoreResult<Option<Course>> {
            self.0.get_course(id).await
        }

        async fn list_courses(&self, owner_id: UserId) -> StoreResult<Vec<Course>> {
            self.0.list_courses(owner_id).await
        }

        async fn update_course(&self, id: CourseId, patch: CoursePatch) -> StoreResult<Option<Course>> {
            self.0.update_course(id, patch).await
        }

        async fn create_material(&self, course_id: CourseId, new: NewMaterial) -> StoreResult<Material> {
            self.0.create_material(course_id, new).await
        }

        async fn get_material(&self, id: MaterialId) -> StoreResult<Option<OwnedMaterial>> {
            self.0.get_material(id).await
        }

        async fn list_materials(&self, course_id: CourseId) -> StoreResult<Vec<Material>> {
            self.0.list_materials(course_id).await
        }

        async fn update_material(&self, id: MaterialId, patch: MaterialPatch) -> StoreResult<Option<Material>> {
            self.0.update_material(id, patch).await
        }

        async fn create_quiz(&self, new: NewQuiz) -> StoreResult<Quiz> {
            self.0.create_quiz(new).await
        }

        async fn attach_material(&self, _quiz_id: QuizId, _material_id: MaterialId) -> StoreResult<Quiz> {
            Err(StoreError::Backend("connection reset".into()))
        }

        async fn get_quiz(&self, id: QuizId) -> StoreResult<Option<OwnedQuiz>> {
            self.0.get_quiz(id).await
        }

        async fn list_quizzes(&self, course_id: CourseId) -> StoreResult<Vec<Quiz>> {
            self.0.list_quizzes(course_id).await
        }

        async fn delete_material_cascade(
            &self,
            id: MaterialId,
            derived_title: &str,
        ) -> StoreResult<Option<DeletedMaterial>> {
            self.0.delete_material_cascade(id, derived_title).await
        }

        async fn delete_quizzes_by_title(&self, course_id: CourseId, title: &str) -> StoreResult<Vec<QuizId>> {
            self.0.delete_quizzes_by_title(course_id, title).await
        }

        async fn store_generated_questions(&self, quiz_id: QuizId, questions: Vec<Question>) -> StoreResult<bool> {
            self.0.store_generated_questions(quiz_id, questions).await
        }

        async fn mark_generation_failed(&self, quiz_id: QuizId, error: &str) -> StoreResult<bool> {
            self.0.mark_generation_failed(quiz_id, error).await
        }
    }

    #[tokio::test]
    async fn failed_link_removes_the_new_quiz() {
        let f = fixture().await;
        let pregenerator = QuizPregenerator::new(
            Arc::new(UnlinkableStore(f.store.clone())),
            f.queue.clone(),
            f.metrics.clone(),
        );

        let err = pregenerator.create_material(&f.owner, f.course_id, upload()).await.unwrap_err();
        assert!(matches!(err, LifecycleError::Store(StoreError::Backend(_))));

        assert_eq!(f.store.list_materials(f.course_id).await.unwrap().len(), 1);
        assert!(f.store.list_quizzes(f.course_id).await.unwrap().is_empty());
        assert_eq!(f.queue.store().stats().unwrap().pending, 0);
        assert_eq!(f.metrics.step("quiz.attach_material").failed, 1);
    }
}
