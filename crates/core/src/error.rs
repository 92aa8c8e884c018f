//! Domain error model.

use thiserror::Error;

/// Result type used by the domain crates.
pub type DomainResult<T> = Result<T, DomainError>;

/// Deterministic, business-level failures.
///
/// Storage and transport failures have their own error types in `studyhub-infra`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed input (e.g. a non-positive unit count).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A record relationship would break (e.g. a quiz referencing a material
    /// from another course).
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// Absent, or not visible to the caller.
    #[error("not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    /// No authenticated principal.
    #[error("unauthorized")]
    Unauthorized,
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }
}
