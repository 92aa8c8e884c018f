use serde::Deserialize;

use studyhub_core::DomainResult;
use studyhub_courses::{Course, CoursePatch, Material, MaterialPatch, NewCourse, NewMaterial, Quiz};
use studyhub_infra::lifecycle::MaterialUpload;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CreateCourseRequest {
    pub course_name: String,
    pub course_code: String,
    pub course_units: i64,
}

impl CreateCourseRequest {
    pub fn into_new_course(self) -> DomainResult<NewCourse> {
        NewCourse::new(self.course_name, self.course_code, self.course_units)
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateCourseRequest {
    pub course_name: Option<String>,
    pub course_code: Option<String>,
    pub course_units: Option<i64>,
}

impl UpdateCourseRequest {
    pub fn into_patch(self) -> DomainResult<CoursePatch> {
        CoursePatch::new(self.course_name, self.course_code, self.course_units)
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateMaterialRequest {
    pub material_file_url: String,
    pub file_name: String,
    pub file_type: String,
    pub file_size: i64,
}

impl CreateMaterialRequest {
    pub fn into_new_material(self) -> DomainResult<NewMaterial> {
        NewMaterial::new(self.material_file_url, self.file_name, self.file_type, self.file_size)
    }
}

/// The blob reference is fixed at upload; only metadata can change.
#[derive(Debug, Deserialize)]
pub struct UpdateMaterialRequest {
    pub file_name: Option<String>,
    pub file_type: Option<String>,
}

impl UpdateMaterialRequest {
    pub fn into_patch(self) -> DomainResult<MaterialPatch> {
        MaterialPatch::new(self.file_name, self.file_type)
    }
}

// -------------------------
// JSON mapping
// -------------------------

pub fn course_to_json(c: Course) -> serde_json::Value {
    serde_json::json!({
        "id": c.id.to_string(),
        "owner_id": c.owner_id.to_string(),
        "course_name": c.course_name,
        "course_code": c.course_code,
        "course_units": c.course_units.get(),
        "created_at": c.created_at.to_rfc3339(),
        "updated_at": c.updated_at.to_rfc3339(),
    })
}

pub fn material_to_json(m: Material) -> serde_json::Value {
    serde_json::json!({
        "id": m.id.to_string(),
        "course_id": m.course_id.to_string(),
        "material_file_url": m.material_file_url,
        "file_name": m.file_name,
        "file_type": m.file_type,
        "file_size": m.file_size,
        "uploaded_at": m.uploaded_at.to_rfc3339(),
    })
}

/// Listing view: no question bodies.
pub fn quiz_summary_to_json(q: &Quiz) -> serde_json::Value {
    serde_json::json!({
        "id": q.id.to_string(),
        "course_id": q.course_id.to_string(),
        "quiz_title": q.quiz_title,
        "is_generated": q.is_generated,
        "number_of_questions": q.number_of_questions,
        "material_ids": q.material_ids.iter().map(|id| id.to_string()).collect::<Vec<_>>(),
        "generation_status": q.generation_status.as_str(),
        "generation_error": q.generation_error,
        "created_at": q.created_at.to_rfc3339(),
    })
}

pub fn quiz_to_json(q: Quiz) -> serde_json::Value {
    let mut body = quiz_summary_to_json(&q);
    body["questions"] = serde_json::to_value(&q.questions).unwrap_or_default();
    body
}

pub fn upload_to_json(upload: MaterialUpload) -> serde_json::Value {
    serde_json::json!({
        "material": material_to_json(upload.material),
        "quiz": quiz_summary_to_json(&upload.quiz),
        "generation_job_id": upload.generation_job.to_string(),
    })
}
