use std::sync::Arc;

use tracing::{info, warn};

use studyhub_auth::{authorize_owner, Principal};
use studyhub_core::{CourseId, MaterialId, QuizId};
use studyhub_courses::{Course, CoursePatch, Material, MaterialPatch, NewCourse, NewMaterial, Quiz};
use studyhub_infra::{
    config::AppConfig,
    external::{
        HttpObjectStorage, HttpQuestionGenerator, InMemoryObjectStorage, ObjectStorage, QuestionGenerator,
        StaticQuestionGenerator,
    },
    jobs::{InMemoryJobStore, JobExecutorConfig, JobExecutorHandle, JobStoreQueue, RetryPolicy, TaskQueue},
    lifecycle::{DeletionCoordinator, DeletionReceipt, LifecycleError, LifecycleResult, MaterialUpload, QuizPregenerator},
    store::{InMemoryResourceStore, PostgresResourceStore, ResourceStore},
    workers,
};
use studyhub_observability::InMemoryMetrics;

type LocalQueue = JobStoreQueue<Arc<InMemoryJobStore>>;

/// Everything the handlers need, built once at startup.
///
/// Every read and write goes through the ownership guard: a course, material
/// or quiz the caller does not own behaves exactly like a missing one.
pub struct AppServices {
    store: Arc<dyn ResourceStore>,
    /// Present when jobs run in-process; `None` when an external broker
    /// receives them.
    local_queue: Option<Arc<LocalQueue>>,
    pregenerator: QuizPregenerator,
    deletion: DeletionCoordinator,
    metrics: Arc<InMemoryMetrics>,
}

impl AppServices {
    fn assemble(store: Arc<dyn ResourceStore>, queue: Arc<dyn TaskQueue>, local_queue: Option<Arc<LocalQueue>>) -> Self {
        let metrics = Arc::new(InMemoryMetrics::with_tracing());
        Self {
            pregenerator: QuizPregenerator::new(store.clone(), queue.clone(), metrics.clone()),
            deletion: DeletionCoordinator::new(store.clone(), queue, metrics.clone()),
            store,
            local_queue,
            metrics,
        }
    }

    fn local(store: Arc<dyn ResourceStore>, config: &AppConfig) -> Self {
        let queue = Arc::new(
            JobStoreQueue::new(InMemoryJobStore::arc())
                .with_retry_policy(RetryPolicy::default().with_max_attempts(config.worker.max_attempts)),
        );
        Self::assemble(store, queue.clone(), Some(queue))
    }

    /// In-memory store and in-process queue.
    pub fn in_memory(config: &AppConfig) -> Self {
        Self::local(Arc::new(InMemoryResourceStore::new()), config)
    }

    /// Pick backends from configuration.
    pub async fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let store: Arc<dyn ResourceStore> = match &config.database_url {
            Some(url) => {
                info!("using postgres resource store");
                Arc::new(PostgresResourceStore::connect(url).await?)
            }
            None => {
                warn!("DATABASE_URL not set; using in-memory resource store");
                Arc::new(InMemoryResourceStore::new())
            }
        };

        #[cfg(feature = "redis")]
        if let Some(url) = &config.redis_url {
            info!("publishing jobs to redis");
            let queue = Arc::new(studyhub_infra::jobs::RedisTaskQueue::new(url, None)?);
            return Ok(Self::assemble(store, queue, None));
        }
        #[cfg(not(feature = "redis"))]
        if config.redis_url.is_some() {
            warn!("REDIS_URL is set but redis support is not compiled in; using the in-process queue");
        }

        Ok(Self::local(store, config))
    }

    /// Start the in-process job executor. `None` when jobs go to an external
    /// broker.
    pub fn spawn_workers(&self, config: &AppConfig) -> anyhow::Result<Option<JobExecutorHandle>> {
        let Some(queue) = &self.local_queue else {
            return Ok(None);
        };

        let generator: Arc<dyn QuestionGenerator> = match &config.question_service_url {
            Some(url) => Arc::new(HttpQuestionGenerator::new(url)?),
            None => {
                warn!("QUESTION_SERVICE_URL not set; generating placeholder questions");
                Arc::new(StaticQuestionGenerator)
            }
        };
        let storage: Arc<dyn ObjectStorage> = match &config.storage {
            Some(s) => Arc::new(HttpObjectStorage::new(&s.url, &s.bucket, s.api_key.clone())?),
            None => {
                warn!("STORAGE_URL not set; blob removals are only recorded");
                Arc::new(InMemoryObjectStorage::new())
            }
        };

        let executor_config = JobExecutorConfig::default()
            .with_name("studyhub-jobs")
            .with_poll_interval(config.worker.poll_interval)
            .with_max_concurrent(config.worker.max_concurrent);

        Ok(Some(workers::spawn_workers(
            queue.store().clone(),
            self.store.clone(),
            generator,
            storage,
            executor_config,
        )))
    }

    /// The in-process job store, if jobs run locally.
    pub fn job_store(&self) -> Option<&Arc<InMemoryJobStore>> {
        self.local_queue.as_ref().map(|q| q.store())
    }

    /// Open or close the in-process queue (no-op with an external broker).
    pub fn set_queue_accepting(&self, accepting: bool) {
        if let Some(queue) = &self.local_queue {
            queue.set_accepting(accepting);
        }
    }

    pub fn metrics(&self) -> &InMemoryMetrics {
        &self.metrics
    }

    // -------------------------
    // Courses
    // -------------------------

    pub async fn create_course(&self, principal: &Principal, new: NewCourse) -> LifecycleResult<Course> {
        let course = self.store.create_course(principal.user_id, new).await?;
        info!(course_id = %course.id, owner_id = %course.owner_id, "course created");
        Ok(course)
    }

    pub async fn list_courses(&self, principal: &Principal) -> LifecycleResult<Vec<Course>> {
        Ok(self.store.list_courses(principal.user_id).await?)
    }

    pub async fn course(&self, principal: &Principal, course_id: CourseId) -> LifecycleResult<Course> {
        let course = self.store.get_course(course_id).await?;
        Ok(authorize_owner(principal, course)?)
    }

    pub async fn update_course(
        &self,
        principal: &Principal,
        course_id: CourseId,
        patch: CoursePatch,
    ) -> LifecycleResult<Course> {
        self.course(principal, course_id).await?;
        self.store
            .update_course(course_id, patch)
            .await?
            .ok_or(LifecycleError::NotFound)
    }

    // -------------------------
    // Materials
    // -------------------------

    pub async fn create_material(
        &self,
        principal: &Principal,
        course_id: CourseId,
        new: NewMaterial,
    ) -> LifecycleResult<MaterialUpload> {
        self.pregenerator.create_material(principal, course_id, new).await
    }

    pub async fn list_materials(&self, principal: &Principal, course_id: CourseId) -> LifecycleResult<Vec<Material>> {
        self.course(principal, course_id).await?;
        Ok(self.store.list_materials(course_id).await?)
    }

    /// `course_id` narrows the lookup when the route is nested under a course.
    pub async fn material(
        &self,
        principal: &Principal,
        course_id: Option<CourseId>,
        material_id: MaterialId,
    ) -> LifecycleResult<Material> {
        let owned = self.store.get_material(material_id).await?;
        let material = authorize_owner(principal, owned)?.material;
        match course_id {
            Some(c) if c != material.course_id => Err(LifecycleError::NotFound),
            _ => Ok(material),
        }
    }

    pub async fn update_material(
        &self,
        principal: &Principal,
        course_id: Option<CourseId>,
        material_id: MaterialId,
        patch: MaterialPatch,
    ) -> LifecycleResult<Material> {
        self.material(principal, course_id, material_id).await?;
        self.store
            .update_material(material_id, patch)
            .await?
            .ok_or(LifecycleError::NotFound)
    }

    pub async fn delete_material(
        &self,
        principal: &Principal,
        course_id: Option<CourseId>,
        material_id: MaterialId,
    ) -> LifecycleResult<DeletionReceipt> {
        self.material(principal, course_id, material_id).await?;
        self.deletion.delete_material(principal, material_id).await
    }

    // -------------------------
    // Quizzes
    // -------------------------

    pub async fn list_quizzes(&self, principal: &Principal, course_id: CourseId) -> LifecycleResult<Vec<Quiz>> {
        self.course(principal, course_id).await?;
        Ok(self.store.list_quizzes(course_id).await?)
    }

    pub async fn quiz(&self, principal: &Principal, quiz_id: QuizId) -> LifecycleResult<Quiz> {
        let owned = self.store.get_quiz(quiz_id).await?;
        Ok(authorize_owner(principal, owned)?.quiz)
    }
}
