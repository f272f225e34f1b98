//! Liveness probe for the identity provider.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::json;
use std::sync::Arc;
use tracing::error;

use super::error::INTERNAL_ERROR;
use crate::provider::IdentityProvider;

#[derive(Clone)]
pub struct HealthState {
    pub provider: Arc<dyn IdentityProvider>,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/", get(health)).with_state(state)
}

async fn health(State(state): State<HealthState>) -> Response {
    match state.provider.health().await {
        Ok(()) => Json(json!({ "ok": true })).into_response(),
        Err(e) => {
            error!(error = %e, "Provider health check failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "ok": false, "error": INTERNAL_ERROR })),
            )
                .into_response()
        }
    }
}
