use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use tracing::info;

use studyhub_core::{CourseId, MaterialId};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new().route(
        "/:material_id",
        get(get_material).patch(update_material).delete(delete_material),
    )
}

pub async fn get_material(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(material_id): Path<String>,
) -> axum::response::Response {
    get_material_in(services, principal, None, material_id).await
}

pub async fn update_material(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(material_id): Path<String>,
    body: Result<Json<dto::UpdateMaterialRequest>, JsonRejection>,
) -> axum::response::Response {
    let body = match errors::json_body(body) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    update_material_in(services, principal, None, material_id, body).await
}

pub async fn delete_material(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(material_id): Path<String>,
) -> axum::response::Response {
    delete_material_in(services, principal, None, material_id).await
}

// Shared with the course-nested routes, which also pin the course.

pub(crate) async fn get_material_in(
    services: Arc<AppServices>,
    principal: PrincipalContext,
    course_id: Option<CourseId>,
    material_id: String,
) -> axum::response::Response {
    let material_id: MaterialId = match errors::parse_id(&material_id, "material") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.material(principal.principal(), course_id, material_id).await {
        Ok(material) => (StatusCode::OK, Json(dto::material_to_json(material))).into_response(),
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}

pub(crate) async fn update_material_in(
    services: Arc<AppServices>,
    principal: PrincipalContext,
    course_id: Option<CourseId>,
    material_id: String,
    body: dto::UpdateMaterialRequest,
) -> axum::response::Response {
    let material_id: MaterialId = match errors::parse_id(&material_id, "material") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let patch = match body.into_patch() {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };
    match services
        .update_material(principal.principal(), course_id, material_id, patch)
        .await
    {
        Ok(material) => (StatusCode::OK, Json(dto::material_to_json(material))).into_response(),
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}

pub(crate) async fn delete_material_in(
    services: Arc<AppServices>,
    principal: PrincipalContext,
    course_id: Option<CourseId>,
    material_id: String,
) -> axum::response::Response {
    let material_id: MaterialId = match errors::parse_id(&material_id, "material") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services
        .delete_material(principal.principal(), course_id, material_id)
        .await
    {
        Ok(receipt) => {
            info!(
                material_id = %receipt.material_id,
                deleted_quizzes = receipt.deleted_quiz_ids.len(),
                cleanup_submitted = receipt.cleanup_job.is_some(),
                "material deleted"
            );
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}
