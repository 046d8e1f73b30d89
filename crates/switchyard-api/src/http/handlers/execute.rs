//! Execution handler.

use std::time::Instant;

use axum::Json;
use axum::extract::State;

use switchyard_core::orchestrator::ExecutionOutcome;
use switchyard_types::operation::OperationRequest;

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// POST /api/v1/execute - Run one operation through its fallback chain.
///
/// Exhaustion maps to 503 with every candidate failure in the error details.
pub async fn execute(
    State(state): State<AppState>,
    Json(request): Json<OperationRequest>,
) -> Result<ApiResponse<ExecutionOutcome>, AppError> {
    let start = Instant::now();
    if request.operation.as_str().is_empty() {
        return Err(AppError::Validation("operation must not be empty".to_string()));
    }

    let outcome = state.orchestrator.execute(&request).await?;
    tracing::debug!(
        request_id = %outcome.request_id,
        provider = %outcome.provider,
        "execute served over http"
    );

    let audit = format!("/api/v1/audit?provider={}", outcome.provider);
    Ok(ApiResponse::success(outcome, start).with_link("audit", &audit))
}
