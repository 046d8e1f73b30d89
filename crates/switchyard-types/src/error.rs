use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::operation::OperationKind;
use crate::record::ErrorKind;

/// Errors returned by a provider capability (`invoke`).
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// The provider understood the request and refused it (domain error).
    #[error("rejected: {message}")]
    Rejected { message: String },

    /// The remote side reported that we exceeded its rate limit.
    #[error("rate limited by provider (retry after {retry_after_ms:?}ms)")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("timed out")]
    Timeout,

    #[error("internal provider error: {0}")]
    Internal(String),
}

/// Why a single candidate did not produce a result.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    #[error("rate limit denied")]
    RateLimitDenied,

    #[error("timed out after {timeout_ms}ms")]
    ProviderTimeout { timeout_ms: u64 },

    #[error("provider error: {message}")]
    ProviderError { message: String },

    #[error("provider unavailable")]
    ProviderUnavailable,
}

impl FailureReason {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FailureReason::RateLimitDenied => ErrorKind::RateLimitDenied,
            FailureReason::ProviderTimeout { .. } => ErrorKind::ProviderTimeout,
            FailureReason::ProviderError { .. } => ErrorKind::ProviderError,
            FailureReason::ProviderUnavailable => ErrorKind::ProviderUnavailable,
        }
    }
}

/// A provider paired with the reason it was skipped or failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateFailure {
    pub provider: String,
    pub reason: FailureReason,
}

impl std::fmt::Display for CandidateFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.provider, self.reason)
    }
}

/// Errors surfaced to callers of `execute`.
#[derive(Debug, Clone, Error)]
pub enum OrchestratorError {
    #[error("all providers exhausted for {operation}: [{}]", format_failures(.failures))]
    AllProvidersExhausted {
        operation: OperationKind,
        failures: Vec<CandidateFailure>,
    },

    #[error("no routing rule for operation '{0}'")]
    NoRoute(OperationKind),

    #[error("execution cancelled")]
    Cancelled,
}

fn format_failures(failures: &[CandidateFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {message}")]
    Io { path: String, message: String },

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("duplicate provider '{0}'")]
    DuplicateProvider(String),

    #[error("provider '{provider}' has an invalid limit: {message}")]
    InvalidLimit { provider: String, message: String },

    #[error("provider '{provider}' has priority {priority} outside [0, 1]")]
    InvalidPriority { provider: String, priority: f64 },

    #[error("routing rule for '{operation}' references unknown provider '{provider}'")]
    UnknownProvider { operation: String, provider: String },

    #[error("routing rule for '{operation}' is invalid: {message}")]
    InvalidRoute { operation: String, message: String },

    #[error("invalid setting {field}: {message}")]
    InvalidSetting { field: String, message: String },
}

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("query error: {0}")]
    Query(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhausted_error_lists_every_failure() {
        let err = OrchestratorError::AllProvidersExhausted {
            operation: OperationKind::GetMarketData,
            failures: vec![
                CandidateFailure {
                    provider: "a".to_string(),
                    reason: FailureReason::ProviderTimeout { timeout_ms: 500 },
                },
                CandidateFailure {
                    provider: "b".to_string(),
                    reason: FailureReason::RateLimitDenied,
                },
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("get_market_data"));
        assert!(msg.contains("a: timed out after 500ms"));
        assert!(msg.contains("b: rate limit denied"));
    }

    #[test]
    fn test_failure_reason_kind() {
        assert_eq!(
            FailureReason::ProviderError {
                message: "x".to_string()
            }
            .kind(),
            ErrorKind::ProviderError
        );
        assert_eq!(
            FailureReason::ProviderUnavailable.kind(),
            ErrorKind::ProviderUnavailable
        );
    }

    #[test]
    fn test_repository_error_carries_query_detail() {
        let err = RepositoryError::Query("database is locked".to_string());
        assert_eq!(err.to_string(), "query error: database is locked");
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::UnknownProvider {
            operation: "place_order".to_string(),
            provider: "ghost".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "routing rule for 'place_order' references unknown provider 'ghost'"
        );
    }
}
