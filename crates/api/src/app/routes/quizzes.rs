use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use studyhub_core::QuizId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new().route("/:quiz_id", get(get_quiz))
}

/// Quiz detail including questions once generation has finished.
pub async fn get_quiz(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(quiz_id): Path<String>,
) -> axum::response::Response {
    let quiz_id: QuizId = match errors::parse_id(&quiz_id, "quiz") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.quiz(principal.principal(), quiz_id).await {
        Ok(quiz) => (StatusCode::OK, Json(dto::quiz_to_json(quiz))).into_response(),
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}
