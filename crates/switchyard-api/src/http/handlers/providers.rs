//! Provider inspection handlers.

use std::time::Instant;

use axum::extract::{Path, State};
use serde::Serialize;

use switchyard_core::rate_limiter::UsageSnapshot;
use switchyard_types::health::HealthSnapshot;
use switchyard_types::operation::OperationKind;
use switchyard_types::provider::ProviderConfig;

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// Configuration, health and rate usage of one provider.
#[derive(Debug, Serialize)]
pub struct ProviderView {
    pub name: String,
    pub config: ProviderConfig,
    pub health: Option<HealthSnapshot>,
    pub usage: Option<UsageSnapshot>,
    /// Operations whose fallback chain names this provider.
    pub operations: Vec<OperationKind>,
}

async fn view(state: &AppState, config: ProviderConfig) -> ProviderView {
    let orchestrator = &state.orchestrator;
    let operations = orchestrator
        .config()
        .await
        .routing
        .iter()
        .filter(|(_, chain)| chain.iter().any(|p| p == &config.name))
        .map(|(op, _)| op.clone())
        .collect();
    ProviderView {
        name: config.name.clone(),
        health: orchestrator.health().health(&config.name),
        usage: orchestrator.limiter().snapshot(&config.name),
        operations,
        config,
    }
}

/// GET /api/v1/providers - All configured providers, in config order.
pub async fn list_providers(
    State(state): State<AppState>,
) -> Result<ApiResponse<Vec<ProviderView>>, AppError> {
    let start = Instant::now();
    let config = state.orchestrator.config().await;

    let mut views = Vec::with_capacity(config.providers.len());
    for provider in config.providers {
        views.push(view(&state, provider).await);
    }

    Ok(ApiResponse::success(views, start).with_link("self", "/api/v1/providers"))
}

/// GET /api/v1/providers/{name} - One provider by name.
pub async fn get_provider(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<ApiResponse<ProviderView>, AppError> {
    let start = Instant::now();
    let provider = state
        .orchestrator
        .config()
        .await
        .provider(&name)
        .cloned()
        .ok_or_else(|| AppError::NotFound(format!("Provider '{name}' not found")))?;

    let resp = ApiResponse::success(view(&state, provider).await, start)
        .with_link("self", &format!("/api/v1/providers/{name}"));
    Ok(resp)
}
