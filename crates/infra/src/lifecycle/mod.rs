//! Material lifecycle orchestration.
//!
//! - Upload: persist the material, create its placeholder quiz, submit a
//!   question generation job
//! - Delete: remove the material with its quiz, submit a cleanup job
//!
//! Neither path waits on the jobs it submits.

pub mod deletion;
pub mod pregeneration;

use thiserror::Error;

use studyhub_auth::AccessError;
use studyhub_core::DomainError;

use crate::store::StoreError;

pub use deletion::{DeletionCoordinator, DeletionReceipt};
pub use pregeneration::{MaterialUpload, QuizPregenerator};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    /// Absent, or not owned by the caller.
    #[error("not found")]
    NotFound,

    #[error("{0}")]
    Validation(String),

    #[error("forbidden")]
    Forbidden,

    #[error(transparent)]
    Store(StoreError),
}

impl From<AccessError> for LifecycleError {
    fn from(err: AccessError) -> Self {
        match err {
            AccessError::NotFound => LifecycleError::NotFound,
            AccessError::Forbidden => LifecycleError::Forbidden,
        }
    }
}

impl From<StoreError> for LifecycleError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => LifecycleError::NotFound,
            other => LifecycleError::Store(other),
        }
    }
}

impl From<DomainError> for LifecycleError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::NotFound => LifecycleError::NotFound,
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => LifecycleError::Validation(msg),
            other => LifecycleError::Validation(other.to_string()),
        }
    }
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;
