//! Simulated provider backend.
//!
//! Stands in for real broker connections in the CLI and server. Each
//! provider answers after a fixed latency and fails on a deterministic
//! cadence, so routing, fallback and health behaviour can be exercised
//! without network access.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use switchyard_core::provider::{BoxProvider, Params, Provider, ProviderRegistry};
use switchyard_types::config::OrchestratorConfig;
use switchyard_types::error::ProviderError;
use switchyard_types::health::ProbeOutcome;
use switchyard_types::operation::OperationKind;

/// Behaviour of one simulated provider, read from `[simulation.<name>]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationProfile {
    /// Time taken by every invocation and probe.
    #[serde(default = "default_latency_ms")]
    pub latency_ms: u64,

    /// Every Nth invocation fails with an internal error.
    #[serde(default)]
    pub fail_every: Option<u64>,

    /// Every Nth invocation is rejected as rate limited by the remote side.
    #[serde(default)]
    pub throttle_every: Option<u64>,

    /// Retry-after hint attached to throttled responses.
    #[serde(default)]
    pub retry_after_ms: Option<u64>,

    /// Health probes report unhealthy.
    #[serde(default)]
    pub probe_fails: bool,
}

fn default_latency_ms() -> u64 {
    25
}

impl Default for SimulationProfile {
    fn default() -> Self {
        Self {
            latency_ms: default_latency_ms(),
            fail_every: None,
            throttle_every: None,
            retry_after_ms: None,
            probe_fails: false,
        }
    }
}

/// In-process provider driven by a [`SimulationProfile`].
pub struct SimulatedProvider {
    name: String,
    profile: SimulationProfile,
    calls: Arc<AtomicU64>,
    probe_fails: Arc<AtomicBool>,
}

impl SimulatedProvider {
    pub fn new(name: impl Into<String>, profile: SimulationProfile) -> Self {
        let probe_fails = profile.probe_fails;
        Self {
            name: name.into(),
            profile,
            calls: Arc::new(AtomicU64::new(0)),
            probe_fails: Arc::new(AtomicBool::new(probe_fails)),
        }
    }

    pub fn profile(&self) -> &SimulationProfile {
        &self.profile
    }

    /// Invocations received so far.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Shared switch for flipping probe results while running.
    pub fn probe_switch(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.probe_fails)
    }
}

fn hits(cadence: Option<u64>, sequence: u64) -> bool {
    matches!(cadence, Some(n) if n > 0 && sequence % n == 0)
}

impl Provider for SimulatedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn invoke(
        &self,
        operation: &OperationKind,
        params: &Params,
        _timeout: Duration,
    ) -> impl Future<Output = Result<serde_json::Value, ProviderError>> + Send {
        let sequence = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let latency = Duration::from_millis(self.profile.latency_ms);
        let throttled = hits(self.profile.throttle_every, sequence);
        let failed = hits(self.profile.fail_every, sequence);
        let retry_after_ms = self.profile.retry_after_ms;
        let body = serde_json::json!({
            "provider": self.name,
            "operation": operation.as_str(),
            "params": params,
            "sequence": sequence,
        });

        async move {
            tokio::time::sleep(latency).await;
            if throttled {
                return Err(ProviderError::RateLimited { retry_after_ms });
            }
            if failed {
                return Err(ProviderError::Internal(format!(
                    "simulated failure on call {sequence}"
                )));
            }
            let mut body = body;
            body["served_at"] = serde_json::Value::String(Utc::now().to_rfc3339());
            Ok(body)
        }
    }

    fn probe(&self, _timeout: Duration) -> impl Future<Output = ProbeOutcome> + Send {
        let latency = Duration::from_millis(self.profile.latency_ms);
        let fails = Arc::clone(&self.probe_fails);
        async move {
            tokio::time::sleep(latency).await;
            if fails.load(Ordering::SeqCst) {
                ProbeOutcome::unhealthy("simulated probe failure")
            } else {
                ProbeOutcome::Healthy
            }
        }
    }
}

/// Register a simulated provider for every configured provider. Providers
/// without a profile get [`SimulationProfile::default`].
pub fn simulated_registry(
    config: &OrchestratorConfig,
    profiles: &BTreeMap<String, SimulationProfile>,
) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    for provider in &config.providers {
        let profile = profiles.get(&provider.name).cloned().unwrap_or_default();
        tracing::debug!(
            provider = %provider.name,
            latency_ms = profile.latency_ms,
            fail_every = ?profile.fail_every,
            "registering simulated provider"
        );
        registry.register(BoxProvider::new(SimulatedProvider::new(
            provider.name.clone(),
            profile,
        )));
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_types::provider::{ProviderConfig, RateWindow, WindowLimit};

    fn params() -> Params {
        let mut params = Params::new();
        params.insert("symbol".to_string(), serde_json::json!("AAPL"));
        params
    }

    #[tokio::test(start_paused = true)]
    async fn test_invoke_echoes_request() {
        let provider = SimulatedProvider::new("alpaca", SimulationProfile::default());
        let body = provider
            .invoke(&OperationKind::GetQuote, &params(), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(body["provider"], "alpaca");
        assert_eq!(body["operation"], "get_quote");
        assert_eq!(body["params"]["symbol"], "AAPL");
        assert_eq!(body["sequence"], 1);
        assert!(body.get("served_at").is_some());
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_cadence() {
        let profile = SimulationProfile {
            fail_every: Some(3),
            ..SimulationProfile::default()
        };
        let provider = SimulatedProvider::new("tradier", profile);
        let mut outcomes = Vec::new();
        for _ in 0..6 {
            let result = provider
                .invoke(&OperationKind::GetQuote, &params(), Duration::from_secs(1))
                .await;
            outcomes.push(result.is_ok());
        }
        assert_eq!(outcomes, vec![true, true, false, true, true, false]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_carries_retry_after() {
        let profile = SimulationProfile {
            throttle_every: Some(1),
            retry_after_ms: Some(750),
            ..SimulationProfile::default()
        };
        let provider = SimulatedProvider::new("ib", profile);
        let err = provider
            .invoke(&OperationKind::PlaceOrder, &params(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProviderError::RateLimited {
                retry_after_ms: Some(750)
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_switch() {
        let provider = SimulatedProvider::new("alpaca", SimulationProfile::default());
        assert!(provider.probe(Duration::from_secs(1)).await.is_healthy());

        provider.probe_switch().store(true, Ordering::SeqCst);
        assert!(!provider.probe(Duration::from_secs(1)).await.is_healthy());
    }

    #[test]
    fn test_registry_covers_every_provider() {
        let config = OrchestratorConfig {
            providers: vec![
                ProviderConfig::new("alpaca", vec![WindowLimit::new(RateWindow::Second, 10)]),
                ProviderConfig::new("tradier", vec![WindowLimit::new(RateWindow::Second, 50)]),
            ],
            ..OrchestratorConfig::default()
        };
        let mut profiles = BTreeMap::new();
        profiles.insert(
            "alpaca".to_string(),
            SimulationProfile {
                latency_ms: 5,
                ..SimulationProfile::default()
            },
        );

        let registry = simulated_registry(&config, &profiles);
        assert_eq!(registry.names(), vec!["alpaca", "tradier"]);
    }
}
