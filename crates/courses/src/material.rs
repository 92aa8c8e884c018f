use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use studyhub_core::{CourseId, DomainError, DomainResult, Entity, MaterialId, UserId};

/// An uploaded file attached to a course.
///
/// `material_file_url` is the reference into object storage; the blob itself
/// is never touched on the request path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Material {
    pub id: MaterialId,
    pub course_id: CourseId,
    pub material_file_url: String,
    pub file_name: String,
    pub file_type: String,
    pub file_size: u64,
    pub uploaded_at: DateTime<Utc>,
}

impl Material {
    pub fn create(course_id: CourseId, new: NewMaterial, now: DateTime<Utc>) -> Self {
        Self {
            id: MaterialId::new(),
            course_id,
            material_file_url: new.material_file_url,
            file_name: new.file_name,
            file_type: new.file_type,
            file_size: new.file_size,
            uploaded_at: now,
        }
    }

    pub fn apply_patch(&mut self, patch: MaterialPatch) {
        if let Some(file_name) = patch.file_name {
            self.file_name = file_name;
        }
        if let Some(file_type) = patch.file_type {
            self.file_type = file_type;
        }
    }
}

impl Entity for Material {
    type Id = MaterialId;

    fn id(&self) -> MaterialId {
        self.id
    }
}

/// A material together with the owner of its course.
///
/// Ownership of a material is never stored on the material itself; it is
/// always resolved through the course.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedMaterial {
    pub material: Material,
    pub owner_id: UserId,
}

/// Validated upload metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMaterial {
    pub material_file_url: String,
    pub file_name: String,
    pub file_type: String,
    pub file_size: u64,
}

impl NewMaterial {
    pub fn new(
        material_file_url: impl Into<String>,
        file_name: impl Into<String>,
        file_type: impl Into<String>,
        file_size: i64,
    ) -> DomainResult<Self> {
        let material_file_url = material_file_url.into();
        if material_file_url.trim().is_empty() {
            return Err(DomainError::validation("material_file_url cannot be empty"));
        }
        let file_name = validate_file_name(file_name.into())?;
        let file_type = file_type.into();
        if file_type.trim().is_empty() {
            return Err(DomainError::validation("file_type cannot be empty"));
        }
        if file_size < 0 {
            return Err(DomainError::validation("file_size cannot be negative"));
        }

        Ok(Self {
            material_file_url,
            file_name,
            file_type: file_type.trim().to_string(),
            file_size: file_size as u64,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaterialPatch {
    pub file_name: Option<String>,
    pub file_type: Option<String>,
}

impl MaterialPatch {
    pub fn new(file_name: Option<String>, file_type: Option<String>) -> DomainResult<Self> {
        let file_type = match file_type {
            Some(t) if t.trim().is_empty() => {
                return Err(DomainError::validation("file_type cannot be empty"));
            }
            other => other.map(|t| t.trim().to_string()),
        };
        Ok(Self {
            file_name: file_name.map(validate_file_name).transpose()?,
            file_type,
        })
    }
}

// File names are kept verbatim (the quiz title is derived from them), only
// blank names are refused.
fn validate_file_name(file_name: String) -> DomainResult<String> {
    if file_name.trim().is_empty() {
        return Err(DomainError::validation("file_name cannot be empty"));
    }
    Ok(file_name)
}
