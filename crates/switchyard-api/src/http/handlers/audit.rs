//! Execution log handlers.

use std::time::Instant;

use axum::extract::{Query, State};
use serde::Deserialize;

use switchyard_infra::sqlite::execution_log::ProviderOutcomeCounts;
use switchyard_types::record::ExecutionRecord;

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

const MAX_LIMIT: i64 = 1000;

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    pub provider: Option<String>,
}

fn default_limit() -> i64 {
    50
}

/// GET /api/v1/audit - Most recent execution records, newest first.
pub async fn list_records(
    State(state): State<AppState>,
    Query(query): Query<AuditQuery>,
) -> Result<ApiResponse<Vec<ExecutionRecord>>, AppError> {
    let start = Instant::now();
    if !(1..=MAX_LIMIT).contains(&query.limit) {
        return Err(AppError::Validation(format!(
            "limit must be between 1 and {MAX_LIMIT}"
        )));
    }

    let records = state
        .execution_log
        .recent(query.limit, query.provider.as_deref())
        .await?;

    Ok(ApiResponse::success(records, start).with_link("counts", "/api/v1/audit/counts"))
}

/// GET /api/v1/audit/counts - Outcome totals per provider.
pub async fn counts(
    State(state): State<AppState>,
) -> Result<ApiResponse<Vec<ProviderOutcomeCounts>>, AppError> {
    let start = Instant::now();
    let counts = state.execution_log.counts().await?;
    Ok(ApiResponse::success(counts, start))
}
