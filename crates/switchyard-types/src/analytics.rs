//! Dashboard-facing analytics outputs.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::provider::RateWindow;

/// Usage fraction per configured window, per provider.
pub type RateLimitAnalytics = BTreeMap<String, BTreeMap<RateWindow, f64>>;

/// How evenly successful traffic is spread across providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadBalancingInsights {
    /// 1.0 for a perfectly even split, 0.0 when one provider takes everything.
    pub efficiency: f64,
    /// Share of successful requests per provider, summing to 1.0 when any exist.
    pub per_provider_share: BTreeMap<String, f64>,
    pub total_successes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// Advisory suggestion for operators. Never feeds back into routing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationSuggestion {
    pub provider: String,
    pub suggestion: String,
    pub severity: Severity,
}

/// Per-provider counters accumulated from the execution stream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderActivity {
    pub successes: u64,
    pub failures: u64,
    pub timeouts: u64,
    pub cancelled: u64,
    pub avg_latency_ms: Option<f64>,
    /// Ranking passes this provider took part in.
    pub rank_appearances: u64,
    pub spike_demotions: u64,
    pub near_limit_demotions: u64,
    pub health_transitions: u64,
}

impl ProviderActivity {
    pub fn attempts(&self) -> u64 {
        self.successes + self.failures
    }

    pub fn success_rate(&self) -> Option<f64> {
        let attempts = self.attempts();
        (attempts > 0).then(|| self.successes as f64 / attempts as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_orders_by_urgency() {
        assert!(Severity::Critical > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
    }

    #[test]
    fn test_activity_success_rate() {
        let mut activity = ProviderActivity::default();
        assert_eq!(activity.success_rate(), None);
        activity.successes = 3;
        activity.failures = 1;
        assert_eq!(activity.success_rate(), Some(0.75));
    }

    #[test]
    fn test_rate_limit_analytics_serializes_window_keys() {
        let mut analytics = RateLimitAnalytics::new();
        analytics
            .entry("alpaca".to_string())
            .or_default()
            .insert(RateWindow::Second, 0.5);
        let json = serde_json::to_string(&analytics).unwrap();
        assert_eq!(json, r#"{"alpaca":{"second":0.5}}"#);
    }
}
