//! Persistence for courses, materials and quizzes.
//!
//! The store knows nothing about principals. Ownership is decided by the
//! guard at the boundary; lookups return the owning user alongside the record
//! so the guard can do its job without another round trip.

pub mod in_memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;

use studyhub_core::{CourseId, DomainError, MaterialId, QuizId, UserId};
use studyhub_courses::{
    Course, CoursePatch, Material, MaterialPatch, NewCourse, NewMaterial, NewQuiz, OwnedMaterial,
    OwnedQuiz, Question, Quiz,
};

pub use in_memory::InMemoryResourceStore;
pub use postgres::PostgresResourceStore;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A referenced parent record does not exist.
    #[error("not found")]
    NotFound,

    #[error("invariant violated: {0}")]
    Invariant(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<DomainError> for StoreError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::NotFound => StoreError::NotFound,
            DomainError::InvariantViolation(msg) => StoreError::Invariant(msg),
            other => StoreError::Backend(other.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// What a material deletion removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletedMaterial {
    pub material: Material,
    pub owner_id: UserId,
    pub deleted_quiz_ids: Vec<QuizId>,
}

#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn create_course(&self, owner_id: UserId, new: NewCourse) -> StoreResult<Course>;

    async fn get_course(&self, id: CourseId) -> StoreResult<Option<Course>>;

    /// Courses owned by `owner_id`, oldest first.
    async fn list_courses(&self, owner_id: UserId) -> StoreResult<Vec<Course>>;

    async fn update_course(&self, id: CourseId, patch: CoursePatch) -> StoreResult<Option<Course>>;

    /// Fails with [`StoreError::NotFound`] when the course does not exist.
    async fn create_material(&self, course_id: CourseId, new: NewMaterial) -> StoreResult<Material>;

    async fn get_material(&self, id: MaterialId) -> StoreResult<Option<OwnedMaterial>>;

    async fn list_materials(&self, course_id: CourseId) -> StoreResult<Vec<Material>>;

    async fn update_material(&self, id: MaterialId, patch: MaterialPatch) -> StoreResult<Option<Material>>;

    async fn create_quiz(&self, new: NewQuiz) -> StoreResult<Quiz>;

    /// Add a material to a quiz. Both must exist and share a course.
    async fn attach_material(&self, quiz_id: QuizId, material_id: MaterialId) -> StoreResult<Quiz>;

    async fn get_quiz(&self, id: QuizId) -> StoreResult<Option<OwnedQuiz>>;

    async fn list_quizzes(&self, course_id: CourseId) -> StoreResult<Vec<Quiz>>;

    /// Delete a material and the quizzes that belong to it, atomically.
    ///
    /// A quiz belongs to the material when it was created for it, or, for rows
    /// without that link, when its title equals `derived_title` within the
    /// material's course. Returns `None` when the material does not exist.
    async fn delete_material_cascade(
        &self,
        id: MaterialId,
        derived_title: &str,
    ) -> StoreResult<Option<DeletedMaterial>>;

    /// Delete quizzes of `course_id` titled `title` that reference no material.
    async fn delete_quizzes_by_title(&self, course_id: CourseId, title: &str) -> StoreResult<Vec<QuizId>>;

    /// Returns `false` when the quiz no longer exists.
    async fn store_generated_questions(&self, quiz_id: QuizId, questions: Vec<Question>) -> StoreResult<bool>;

    /// Returns `false` when the quiz no longer exists.
    async fn mark_generation_failed(&self, quiz_id: QuizId, error: &str) -> StoreResult<bool>;
}
