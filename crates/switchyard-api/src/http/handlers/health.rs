//! Liveness endpoint.

use std::time::Instant;

use axum::extract::State;
use serde::Serialize;

use crate::http::response::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub providers: usize,
    pub routes: usize,
}

/// GET /health - Process liveness plus configured surface size.
pub async fn health(State(state): State<AppState>) -> ApiResponse<HealthResponse> {
    let start = Instant::now();
    let config = state.orchestrator.config().await;

    ApiResponse::success(
        HealthResponse {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
            providers: config.providers.len(),
            routes: config.routing.len(),
        },
        start,
    )
    .with_link("providers", "/api/v1/providers")
}
