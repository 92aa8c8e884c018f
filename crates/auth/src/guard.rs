//! Ownership guard.
//!
//! One capability check for every resource kind: a principal may act on a
//! resource iff it owns the course the resource lives in. A denial looks
//! exactly like a missing record, so callers cannot probe for other users'
//! courses or materials.

use thiserror::Error;
use tracing::debug;

use studyhub_core::UserId;
use studyhub_courses::{Course, OwnedMaterial, OwnedQuiz};

use crate::Principal;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AccessError {
    /// Absent or owned by someone else.
    #[error("not found")]
    NotFound,

    /// Only for callers where revealing existence is acceptable. The guard
    /// itself never returns it.
    #[error("forbidden")]
    Forbidden,
}

/// A resource whose access is decided by its owning course's owner.
pub trait Owned {
    fn owner_id(&self) -> UserId;

    fn is_owned_by(&self, principal: &Principal) -> bool {
        self.owner_id() == principal.user_id
    }
}

impl Owned for Course {
    fn owner_id(&self) -> UserId {
        self.owner_id
    }
}

impl Owned for OwnedMaterial {
    fn owner_id(&self) -> UserId {
        self.owner_id
    }
}

impl Owned for OwnedQuiz {
    fn owner_id(&self) -> UserId {
        self.owner_id
    }
}

impl<T: Owned + ?Sized> Owned for &T {
    fn owner_id(&self) -> UserId {
        (**self).owner_id()
    }
}

/// Resolve a looked-up resource for `principal`.
///
/// - No IO
/// - No panics
/// - `None` and "owned by someone else" both map to [`AccessError::NotFound`]
pub fn authorize_owner<R: Owned>(principal: &Principal, resource: Option<R>) -> Result<R, AccessError> {
    match resource {
        Some(r) if r.is_owned_by(principal) => Ok(r),
        Some(r) => {
            debug!(
                user_id = %principal.user_id,
                owner_id = %r.owner_id(),
                "ownership check denied"
            );
            Err(AccessError::NotFound)
        }
        None => Err(AccessError::NotFound),
    }
}

/// Borrowing variant of [`authorize_owner`].
pub fn check_owner<R: Owned + ?Sized>(principal: &Principal, resource: &R) -> Result<(), AccessError> {
    if resource.is_owned_by(principal) {
        Ok(())
    } else {
        debug!(user_id = %principal.user_id, "ownership check denied");
        Err(AccessError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use studyhub_courses::{Material, NewCourse, NewMaterial, NewQuiz, Quiz};

    fn course_of(owner: UserId) -> Course {
        Course::create(owner, NewCourse::new("Test Course", "TEST", 5).unwrap(), Utc::now())
    }

    fn material_of(course: &Course) -> OwnedMaterial {
        let new = NewMaterial::new("ref", "a.pdf", "application/pdf", 10).unwrap();
        OwnedMaterial {
            material: Material::create(course.id, new, Utc::now()),
            owner_id: course.owner_id,
        }
    }

    #[test]
    fn owner_is_allowed_on_every_kind() {
        let owner = Principal::new(UserId::new());
        let course = course_of(owner.user_id);
        let material = material_of(&course);
        let quiz = OwnedQuiz {
            quiz: Quiz::create(NewQuiz::pregenerated(&material.material), Utc::now()),
            owner_id: course.owner_id,
        };

        assert!(check_owner(&owner, &course).is_ok());
        assert!(authorize_owner(&owner, Some(material)).is_ok());
        assert!(authorize_owner(&owner, Some(quiz)).is_ok());
    }

    #[test]
    fn foreign_resource_is_indistinguishable_from_missing() {
        let owner = Principal::new(UserId::new());
        let stranger = Principal::new(UserId::new());
        let course = course_of(owner.user_id);

        let denied = authorize_owner(&stranger, Some(course.clone())).unwrap_err();
        let missing = authorize_owner::<Course>(&stranger, None).unwrap_err();
        assert_eq!(denied, missing);
        assert_eq!(denied, AccessError::NotFound);

        assert_eq!(check_owner(&stranger, &material_of(&course)), Err(AccessError::NotFound));
    }
}
