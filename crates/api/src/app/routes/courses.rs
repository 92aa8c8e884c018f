use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use studyhub_core::CourseId;

use crate::app::routes::materials;
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_courses).post(create_course))
        .route("/:course_id", get(get_course).patch(update_course))
        .route("/:course_id/materials", get(list_materials).post(upload_material))
        .route(
            "/:course_id/materials/:material_id",
            get(get_course_material)
                .patch(update_course_material)
                .delete(delete_course_material),
        )
        .route("/:course_id/quizzes", get(list_quizzes))
}

pub async fn create_course(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    body: Result<Json<dto::CreateCourseRequest>, JsonRejection>,
) -> axum::response::Response {
    let body = match errors::json_body(body) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let new = match body.into_new_course() {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };
    match services.create_course(principal.principal(), new).await {
        Ok(course) => (StatusCode::CREATED, Json(dto::course_to_json(course))).into_response(),
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}

pub async fn list_courses(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    match services.list_courses(principal.principal()).await {
        Ok(courses) => {
            let items = courses.into_iter().map(dto::course_to_json).collect::<Vec<_>>();
            (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
        }
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}

pub async fn get_course(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(course_id): Path<String>,
) -> axum::response::Response {
    let course_id: CourseId = match errors::parse_id(&course_id, "course") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.course(principal.principal(), course_id).await {
        Ok(course) => (StatusCode::OK, Json(dto::course_to_json(course))).into_response(),
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}

pub async fn update_course(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(course_id): Path<String>,
    body: Result<Json<dto::UpdateCourseRequest>, JsonRejection>,
) -> axum::response::Response {
    let body = match errors::json_body(body) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let course_id: CourseId = match errors::parse_id(&course_id, "course") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let patch = match body.into_patch() {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };
    match services.update_course(principal.principal(), course_id, patch).await {
        Ok(course) => (StatusCode::OK, Json(dto::course_to_json(course))).into_response(),
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}

pub async fn list_materials(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(course_id): Path<String>,
) -> axum::response::Response {
    let course_id: CourseId = match errors::parse_id(&course_id, "course") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.list_materials(principal.principal(), course_id).await {
        Ok(materials) => {
            let items = materials.into_iter().map(dto::material_to_json).collect::<Vec<_>>();
            (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
        }
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}

pub async fn upload_material(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(course_id): Path<String>,
    body: Result<Json<dto::CreateMaterialRequest>, JsonRejection>,
) -> axum::response::Response {
    let body = match errors::json_body(body) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let course_id: CourseId = match errors::parse_id(&course_id, "course") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let new = match body.into_new_material() {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };
    match services.create_material(principal.principal(), course_id, new).await {
        Ok(upload) => (StatusCode::CREATED, Json(dto::upload_to_json(upload))).into_response(),
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}

pub async fn get_course_material(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path((course_id, material_id)): Path<(String, String)>,
) -> axum::response::Response {
    let course_id: CourseId = match errors::parse_id(&course_id, "course") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    materials::get_material_in(services, principal, Some(course_id), material_id).await
}

pub async fn update_course_material(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path((course_id, material_id)): Path<(String, String)>,
    body: Result<Json<dto::UpdateMaterialRequest>, JsonRejection>,
) -> axum::response::Response {
    let body = match errors::json_body(body) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let course_id: CourseId = match errors::parse_id(&course_id, "course") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    materials::update_material_in(services, principal, Some(course_id), material_id, body).await
}

pub async fn delete_course_material(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path((course_id, material_id)): Path<(String, String)>,
) -> axum::response::Response {
    let course_id: CourseId = match errors::parse_id(&course_id, "course") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    materials::delete_material_in(services, principal, Some(course_id), material_id).await
}

pub async fn list_quizzes(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(course_id): Path<String>,
) -> axum::response::Response {
    let course_id: CourseId = match errors::parse_id(&course_id, "course") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.list_quizzes(principal.principal(), course_id).await {
        Ok(quizzes) => {
            let items = quizzes.iter().map(dto::quiz_summary_to_json).collect::<Vec<_>>();
            (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
        }
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}
