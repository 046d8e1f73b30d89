//! Application error type mapping to HTTP status codes and envelope format.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use switchyard_types::error::{OrchestratorError, RepositoryError};

use crate::http::response::{ApiErrorDetail, ApiResponse};

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// Routing or execution failure.
    Orchestrator(OrchestratorError),
    /// Audit or health persistence failure.
    Repository(RepositoryError),
    /// Unknown resource.
    NotFound(String),
    /// Validation error.
    Validation(String),
}

impl From<OrchestratorError> for AppError {
    fn from(e: OrchestratorError) -> Self {
        AppError::Orchestrator(e)
    }
}

impl From<RepositoryError> for AppError {
    fn from(e: RepositoryError) -> Self {
        AppError::Repository(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            AppError::Orchestrator(OrchestratorError::AllProvidersExhausted {
                operation,
                failures,
            }) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "ALL_PROVIDERS_EXHAUSTED",
                format!("All providers exhausted for {operation}"),
                Some(json!({ "operation": operation, "failures": failures })),
            ),
            AppError::Orchestrator(OrchestratorError::NoRoute(operation)) => (
                StatusCode::NOT_FOUND,
                "NO_ROUTE",
                format!("No routing rule for operation '{operation}'"),
                None,
            ),
            AppError::Orchestrator(OrchestratorError::Cancelled) => (
                StatusCode::REQUEST_TIMEOUT,
                "CANCELLED",
                "Execution cancelled".to_string(),
                None,
            ),
            AppError::Repository(e) => {
                tracing::error!(error = %e, "repository error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "REPOSITORY_ERROR",
                    e.to_string(),
                    None,
                )
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone(), None),
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone(), None)
            }
        };

        ApiResponse::failure(
            status,
            ApiErrorDetail {
                code: code.to_string(),
                message,
                details,
            },
        )
        .into_response()
    }
}
