//! The HTTP API of the injector.
//!
//! All operations are `POST` requests below `/api/injector/` and require the
//! shared secret in the [`API_KEY_HEADER`]. Failures are returned as
//! `{"error": "..."}`.
use std::sync::Arc;

use axum::{
    Router,
    extract::{Request, State},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};
use snafu::ensure;

use crate::engine::SidecarEngine;

mod error;
mod handlers;
mod payloads;

pub use self::error::{ApiError, Payload};

pub const API_KEY_HEADER: &str = "X-API-KEY";

const API_PREFIX: &str = "/api/";

/// State shared by all request handlers.
#[derive(Clone)]
pub struct ApiState {
    pub engine: Arc<SidecarEngine>,
    pub api_key: Arc<str>,
}

/// Builds the router with the root route and all injector routes.
pub fn router(state: ApiState) -> Router {
    let injector = Router::new()
        .route("/GetDeployments", post(handlers::get_deployments))
        .route(
            "/GetSingleDeployment",
            post(handlers::get_single_deployment),
        )
        .route("/SetSidecar", post(handlers::set_sidecar))
        .route("/ClearSidecar", post(handlers::clear_sidecar));

    Router::new()
        .route("/", get(handlers::root))
        .nest("/api/injector", injector)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ))
        .with_state(state)
}

/// Rejects every request below `/api/` without the API key, including those
/// that match no route.

async fn require_api_key(
    State(state): State<ApiState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !request.uri().path().starts_with(API_PREFIX) {
        return Ok(next.run(request).await);
    }

    let api_key = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());
    ensure!(api_key == Some(&*state.api_key), error::UnauthorizedSnafu);

    Ok(next.run(request).await)
}
