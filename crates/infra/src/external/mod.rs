//! Clients for services the workers call: object storage for uploaded
//! blobs, and the question generation service.

pub mod generator;
pub mod storage;

use thiserror::Error;

pub use generator::{GenerationRequest, HttpQuestionGenerator, MaterialSource, QuestionGenerator, StaticQuestionGenerator};
pub use storage::{HttpObjectStorage, InMemoryObjectStorage, ObjectStorage};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExternalError {
    #[error("network error: {0}")]
    Network(String),

    /// Non-success status from the remote service.
    #[error("service returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("failed to parse response: {0}")]
    Parse(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}
