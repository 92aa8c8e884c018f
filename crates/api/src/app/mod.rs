//! HTTP application wiring (Axum router + service wiring).
//!
//! - `services.rs`: backend selection and the owner-scoped operations
//! - `routes/`: HTTP routes + handlers (one file per resource)
//! - `dto.rs`: request DTOs and JSON mapping helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use studyhub_auth::Hs256JwtValidator;
use studyhub_infra::{config::AppConfig, jobs::JobExecutorHandle};

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::AppServices;

/// Router over already-built services.
pub fn build_router(services: Arc<AppServices>, jwt_secret: &str) -> Router {
    let jwt = Arc::new(Hs256JwtValidator::new(jwt_secret.as_bytes()));
    let auth_state = middleware::AuthState { jwt };

    // Everything except the health probe requires a bearer token.
    let protected = routes::router()
        .layer(Extension(services))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware,
        ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
        .layer(ServiceBuilder::new())
}

/// Build services from `config`, start the in-process workers, and return the
/// router. The handle must be kept alive for as long as jobs should run.
pub async fn build_app(config: &AppConfig) -> anyhow::Result<(Router, Option<JobExecutorHandle>)> {
    let services = Arc::new(AppServices::from_config(config).await?);
    let workers = services.spawn_workers(config)?;
    Ok((build_router(services, &config.jwt_secret), workers))
}
