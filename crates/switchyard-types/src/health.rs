//! Provider health classification.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Operability of a provider, driven by probes and execution outcomes.
///
/// `Available -> Degraded -> Unavailable -> Recovering -> Available`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Available,
    Degraded,
    Unavailable,
    Recovering,
}

impl HealthState {
    /// Whether the load balancer may rank this provider without an override.
    pub fn is_routable(self) -> bool {
        !matches!(self, HealthState::Unavailable)
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthState::Available => write!(f, "available"),
            HealthState::Degraded => write!(f, "degraded"),
            HealthState::Unavailable => write!(f, "unavailable"),
            HealthState::Recovering => write!(f, "recovering"),
        }
    }
}

impl FromStr for HealthState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "available" => Ok(HealthState::Available),
            "degraded" => Ok(HealthState::Degraded),
            "unavailable" => Ok(HealthState::Unavailable),
            "recovering" => Ok(HealthState::Recovering),
            other => Err(format!("invalid health state: '{other}'")),
        }
    }
}

/// Result of one lightweight status probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProbeOutcome {
    Healthy,
    Unhealthy { reason: String },
}

impl ProbeOutcome {
    pub fn unhealthy(reason: impl Into<String>) -> Self {
        ProbeOutcome::Unhealthy {
            reason: reason.into(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, ProbeOutcome::Healthy)
    }
}

/// Point-in-time view of a provider's health.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub provider: String,
    pub state: HealthState,
    /// Exponential moving average of observed latency.
    pub avg_latency_ms: Option<f64>,
    pub last_probe_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    /// Success fraction over the recent execution window (1.0 when unknown).
    pub recent_success_rate: f64,
    pub total_calls: u64,
    pub total_failures: u64,
    pub last_error: Option<String>,
    /// When the provider last entered Available.
    pub uptime_since: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_state_roundtrip() {
        for state in [
            HealthState::Available,
            HealthState::Degraded,
            HealthState::Unavailable,
            HealthState::Recovering,
        ] {
            let parsed: HealthState = state.to_string().parse().unwrap();
            assert_eq!(state, parsed);
        }
    }

    #[test]
    fn test_only_unavailable_is_unroutable() {
        assert!(HealthState::Available.is_routable());
        assert!(HealthState::Degraded.is_routable());
        assert!(HealthState::Recovering.is_routable());
        assert!(!HealthState::Unavailable.is_routable());
    }

    #[test]
    fn test_probe_outcome_serde() {
        let json = serde_json::to_string(&ProbeOutcome::unhealthy("503")).unwrap();
        assert!(json.contains("\"status\":\"unhealthy\""));
        let parsed: ProbeOutcome = serde_json::from_str(&json).unwrap();
        assert!(!parsed.is_healthy());
    }
}
