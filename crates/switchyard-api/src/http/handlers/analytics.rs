//! Analytics handlers backed by the live aggregator.

use std::time::Instant;

use axum::extract::State;

use switchyard_types::analytics::{
    LoadBalancingInsights, OptimizationSuggestion, RateLimitAnalytics,
};

use crate::http::response::ApiResponse;
use crate::state::AppState;

/// GET /api/v1/analytics/rate-limits
pub async fn rate_limits(State(state): State<AppState>) -> ApiResponse<RateLimitAnalytics> {
    let start = Instant::now();
    ApiResponse::success(state.analytics.rate_limit_analytics(), start)
}

/// GET /api/v1/analytics/load-balancing
pub async fn load_balancing(State(state): State<AppState>) -> ApiResponse<LoadBalancingInsights> {
    let start = Instant::now();
    ApiResponse::success(state.analytics.load_balancing_insights(), start)
}

/// GET /api/v1/analytics/suggestions
pub async fn suggestions(State(state): State<AppState>) -> ApiResponse<Vec<OptimizationSuggestion>> {
    let start = Instant::now();
    ApiResponse::success(state.analytics.optimization_suggestions(), start)
}
