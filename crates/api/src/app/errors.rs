use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::Json;
use axum::response::IntoResponse;
use serde_json::json;
use tracing::error;

use studyhub_core::DomainError;
use studyhub_infra::lifecycle::LifecycleError;

pub fn lifecycle_error_to_response(err: LifecycleError) -> axum::response::Response {
    match err {
        LifecycleError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        LifecycleError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        LifecycleError::Forbidden => json_error(StatusCode::FORBIDDEN, "forbidden", "forbidden"),
        LifecycleError::Store(e) => {
            error!(error = %e, "store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string())
        }
    }
}

/// Request validation failures raised before any store access.
pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    match err {
        DomainError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        DomainError::Unauthorized => json_error(StatusCode::FORBIDDEN, "unauthorized", "unauthorized"),
        DomainError::InvalidId(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_id", msg),
        DomainError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        DomainError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        DomainError::InvariantViolation(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", msg)
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Parse a path segment into a typed id, or a 400 response.
pub fn parse_id<T: std::str::FromStr>(raw: &str, what: &str) -> Result<T, axum::response::Response> {
    raw.parse()
        .map_err(|_| json_error(StatusCode::BAD_REQUEST, "invalid_id", format!("invalid {what} id")))
}

/// Unwrap a JSON body; malformed or mistyped bodies become a 400.
pub fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, axum::response::Response> {
    body.map(|Json(v)| v)
        .map_err(|rejection| json_error(StatusCode::BAD_REQUEST, "validation_error", rejection.body_text()))
}
