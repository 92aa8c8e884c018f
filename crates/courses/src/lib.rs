//! Course, material and quiz records.
//!
//! Pure domain rules: field validation, the pregenerated quiz naming
//! convention, and the course-equality invariant between quizzes and the
//! materials they reference. No IO.

pub mod course;
pub mod material;
pub mod quiz;

pub use course::{Course, CoursePatch, CourseUnits, NewCourse, MAX_COURSE_UNITS};
pub use material::{Material, MaterialPatch, NewMaterial, OwnedMaterial};
pub use quiz::{
    pregenerated_quiz_title, GenerationStatus, NewQuiz, OwnedQuiz, Question, Quiz,
    DEFAULT_QUESTION_COUNT, PREGENERATED_QUIZ_PREFIX,
};
