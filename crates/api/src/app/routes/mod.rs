use axum::{routing::get, Router};

pub mod courses;
pub mod materials;
pub mod quizzes;
pub mod system;

/// Router for all authenticated (owner-scoped) endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/courses", courses::router())
        .nest("/materials", materials::router())
        .nest("/quizzes", quizzes::router())
}
