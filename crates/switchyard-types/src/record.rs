//! Execution records: the append-only audit trail of provider attempts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::operation::OperationKind;

/// Classification of a per-candidate failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    RateLimitDenied,
    ProviderTimeout,
    ProviderError,
    ProviderUnavailable,
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::RateLimitDenied => write!(f, "rate_limit_denied"),
            ErrorKind::ProviderTimeout => write!(f, "provider_timeout"),
            ErrorKind::ProviderError => write!(f, "provider_error"),
            ErrorKind::ProviderUnavailable => write!(f, "provider_unavailable"),
            ErrorKind::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl FromStr for ErrorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rate_limit_denied" => Ok(ErrorKind::RateLimitDenied),
            "provider_timeout" => Ok(ErrorKind::ProviderTimeout),
            "provider_error" => Ok(ErrorKind::ProviderError),
            "provider_unavailable" => Ok(ErrorKind::ProviderUnavailable),
            "cancelled" => Ok(ErrorKind::Cancelled),
            other => Err(format!("invalid error kind: '{other}'")),
        }
    }
}

/// Outcome of a single sent request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    Failure,
    /// The caller cancelled while the request was in flight.
    Cancelled,
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptOutcome::Success => write!(f, "success"),
            AttemptOutcome::Failure => write!(f, "failure"),
            AttemptOutcome::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl FromStr for AttemptOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(AttemptOutcome::Success),
            "failure" => Ok(AttemptOutcome::Failure),
            "cancelled" => Ok(AttemptOutcome::Cancelled),
            other => Err(format!("invalid attempt outcome: '{other}'")),
        }
    }
}

/// One attempted provider invocation. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: Uuid,
    /// Identifier shared by every attempt of one `execute` call.
    pub request_id: Uuid,
    pub provider: String,
    pub operation: OperationKind,
    pub timestamp: DateTime<Utc>,
    pub latency_ms: u64,
    pub outcome: AttemptOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// 1-based position of this attempt within its `execute` call.
    pub attempt: u32,
}

impl ExecutionRecord {
    pub fn is_success(&self) -> bool {
        self.outcome == AttemptOutcome::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_roundtrip() {
        for kind in [
            ErrorKind::RateLimitDenied,
            ErrorKind::ProviderTimeout,
            ErrorKind::ProviderError,
            ErrorKind::ProviderUnavailable,
            ErrorKind::Cancelled,
        ] {
            let parsed: ErrorKind = kind.to_string().parse().unwrap();
            assert_eq!(kind, parsed);
        }
    }

    #[test]
    fn test_record_serde_omits_empty_error() {
        let record = ExecutionRecord {
            id: Uuid::now_v7(),
            request_id: Uuid::now_v7(),
            provider: "alpaca".to_string(),
            operation: OperationKind::GetQuote,
            timestamp: Utc::now(),
            latency_ms: 42,
            outcome: AttemptOutcome::Success,
            error_kind: None,
            error_message: None,
            attempt: 1,
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("error_kind"));
        assert!(json.contains("\"operation\":\"get_quote\""));
        assert!(record.is_success());
    }
}
