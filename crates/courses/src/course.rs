use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use studyhub_core::{CourseId, DomainError, DomainResult, Entity, UserId};

/// Upper bound for `course_units`.
pub const MAX_COURSE_UNITS: u16 = 30;

const MAX_NAME_LEN: usize = 255;
const MAX_CODE_LEN: usize = 32;

/// Unit count of a course, always within `1..=MAX_COURSE_UNITS`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u16")]
pub struct CourseUnits(u16);

impl CourseUnits {
    pub fn new(raw: i64) -> DomainResult<Self> {
        if raw < 1 || raw > i64::from(MAX_COURSE_UNITS) {
            return Err(DomainError::validation(format!(
                "course_units must be between 1 and {MAX_COURSE_UNITS}"
            )));
        }
        Ok(Self(raw as u16))
    }

    pub fn get(self) -> u16 {
        self.0
    }
}

impl TryFrom<i64> for CourseUnits {
    type Error = DomainError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CourseUnits> for u16 {
    fn from(value: CourseUnits) -> Self {
        value.0
    }
}

/// A course owned by exactly one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: CourseId,
    pub owner_id: UserId,
    pub course_name: String,
    pub course_code: String,
    pub course_units: CourseUnits,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Course {
    pub fn create(owner_id: UserId, new: NewCourse, now: DateTime<Utc>) -> Self {
        Self {
            id: CourseId::new(),
            owner_id,
            course_name: new.course_name,
            course_code: new.course_code,
            course_units: new.course_units,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply_patch(&mut self, patch: CoursePatch, now: DateTime<Utc>) {
        if let Some(name) = patch.course_name {
            self.course_name = name;
        }
        if let Some(code) = patch.course_code {
            self.course_code = code;
        }
        if let Some(units) = patch.course_units {
            self.course_units = units;
        }
        self.updated_at = now;
    }
}

impl Entity for Course {
    type Id = CourseId;

    fn id(&self) -> CourseId {
        self.id
    }
}

/// Validated input for creating a course.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCourse {
    pub course_name: String,
    pub course_code: String,
    pub course_units: CourseUnits,
}

impl NewCourse {
    pub fn new(
        course_name: impl Into<String>,
        course_code: impl Into<String>,
        course_units: i64,
    ) -> DomainResult<Self> {
        Ok(Self {
            course_name: validate_text("course_name", course_name.into(), MAX_NAME_LEN)?,
            course_code: validate_text("course_code", course_code.into(), MAX_CODE_LEN)?,
            course_units: CourseUnits::new(course_units)?,
        })
    }
}

/// Partial update; `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoursePatch {
    pub course_name: Option<String>,
    pub course_code: Option<String>,
    pub course_units: Option<CourseUnits>,
}

impl CoursePatch {
    pub fn new(
        course_name: Option<String>,
        course_code: Option<String>,
        course_units: Option<i64>,
    ) -> DomainResult<Self> {
        Ok(Self {
            course_name: course_name
                .map(|n| validate_text("course_name", n, MAX_NAME_LEN))
                .transpose()?,
            course_code: course_code
                .map(|c| validate_text("course_code", c, MAX_CODE_LEN))
                .transpose()?,
            course_units: course_units.map(CourseUnits::new).transpose()?,
        })
    }
}

fn validate_text(field: &str, value: String, max_len: usize) -> DomainResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation(format!("{field} cannot be empty")));
    }
    if trimmed.chars().count() > max_len {
        return Err(DomainError::validation(format!(
            "{field} must be at most {max_len} characters"
        )));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn new_course_accepts_valid_input() {
        let course = NewCourse::new("Test Course", "TEST", 5).unwrap();
        assert_eq!(course.course_name, "Test Course");
        assert_eq!(course.course_units.get(), 5);
    }

    #[test]
    fn new_course_rejects_blank_name() {
        let err = NewCourse::new("   ", "TEST", 5).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn units_are_bounded() {
        assert!(CourseUnits::new(0).is_err());
        assert!(CourseUnits::new(-3).is_err());
        assert!(CourseUnits::new(i64::from(MAX_COURSE_UNITS) + 1).is_err());
        assert_eq!(CourseUnits::new(i64::from(MAX_COURSE_UNITS)).unwrap().get(), MAX_COURSE_UNITS);
    }

    #[test]
    fn patch_only_touches_provided_fields() {
        let owner = UserId::new();
        let t0 = Utc::now();
        let mut course = Course::create(owner, NewCourse::new("Algebra", "MATH1", 3).unwrap(), t0);

        let patch = CoursePatch::new(None, Some("MATH2".into()), None).unwrap();
        let t1 = t0 + chrono::Duration::seconds(1);
        course.apply_patch(patch, t1);

        assert_eq!(course.course_name, "Algebra");
        assert_eq!(course.course_code, "MATH2");
        assert_eq!(course.course_units.get(), 3);
        assert_eq!(course.updated_at, t1);
        assert_eq!(course.created_at, t0);
    }

    #[test]
    fn units_deserialize_through_validation() {
        let ok: CourseUnits = serde_json::from_str("4").unwrap();
        assert_eq!(ok.get(), 4);
        assert!(serde_json::from_str::<CourseUnits>("0").is_err());
    }

    proptest! {
        #[test]
        fn units_valid_iff_in_range(raw in -100i64..100i64) {
            let in_range = (1..=i64::from(MAX_COURSE_UNITS)).contains(&raw);
            prop_assert_eq!(CourseUnits::new(raw).is_ok(), in_range);
        }
    }
}
