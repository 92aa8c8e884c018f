//! `studyhub-core`: identifiers and the shared domain error model.
//!
//! Nothing in here performs IO; every other crate in the workspace builds on
//! these primitives.

pub mod entity;
pub mod error;
pub mod id;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{CourseId, MaterialId, QuizId, UserId};
