//! Scored provider ranking per operation.
//!
//! Candidates come from the operation's fallback chain, minus providers the
//! caller excluded, disabled providers, and (unless overridden) providers the
//! health monitor marks Unavailable. Each candidate is scored as
//!
//! ```text
//! score = w1 * rate_headroom + w2 * (1 - normalized_latency)
//!       + w3 * recent_success_rate + w4 * static_priority
//! ```
//!
//! and then sorted by partition first:
//!
//! 1. providers below the near-limit threshold on every window,
//! 2. providers at or above it (last-resort fallbacks),
//! 3. Unavailable providers, only when the caller asked for them.
//!
//! Within a partition the preferred provider (if any) goes first, then higher
//! scores, then earlier chain position.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;

use switchyard_types::config::ScoringWeights;
use switchyard_types::error::OrchestratorError;
use switchyard_types::event::{Demotion, DemotionReason};
use switchyard_types::health::HealthState;
use switchyard_types::operation::{OperationKind, RoutingHint};
use switchyard_types::provider::ProviderConfig;

use crate::health::HealthMonitor;
use crate::rate_limiter::RateLimiter;
use crate::routing::RoutingTable;

/// Latency term used before any latency has been observed.
const UNKNOWN_NORMALIZED_LATENCY: f64 = 0.5;

/// Weighted terms that make up a candidate's score.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreBreakdown {
    pub rate_headroom: f64,
    pub latency: f64,
    pub success_rate: f64,
    pub priority: f64,
    /// Total penalty subtracted (spike and health).
    pub penalty: f64,
}

/// Ranking partition, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Partition {
    Normal,
    NearLimit,
    Unavailable,
}

/// One ranked provider with the inputs behind its position.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredCandidate {
    pub provider: String,
    pub score: f64,
    pub partition: Partition,
    pub breakdown: ScoreBreakdown,
    pub max_usage: f64,
    pub spike_predicted: bool,
    pub health: HealthState,
    pub avg_latency_ms: Option<f64>,
    pub preferred: bool,
    /// Position in the configured fallback chain.
    pub chain_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionReason {
    Unavailable,
    ExcludedByHint,
    Disabled,
    NotRegistered,
}

/// A chain member that was left out of the ranking.
#[derive(Debug, Clone, Serialize)]
pub struct Exclusion {
    pub provider: String,
    pub reason: ExclusionReason,
}

/// Result of one ranking pass.
#[derive(Debug, Clone, Serialize)]
pub struct Ranking {
    pub operation: OperationKind,
    pub candidates: Vec<ScoredCandidate>,
    pub excluded: Vec<Exclusion>,
}

impl Ranking {
    /// Ranked provider names, best first.
    pub fn providers(&self) -> Vec<&str> {
        self.candidates.iter().map(|c| c.provider.as_str()).collect()
    }

    /// Providers pushed down by near-limit usage, a predicted spike, or
    /// reduced health.
    pub fn demotions(&self) -> Vec<Demotion> {
        let mut out = Vec::new();
        for c in &self.candidates {
            if c.partition == Partition::NearLimit {
                out.push(Demotion {
                    provider: c.provider.clone(),
                    reason: DemotionReason::NearLimit,
                });
            }
            if c.spike_predicted {
                out.push(Demotion {
                    provider: c.provider.clone(),
                    reason: DemotionReason::SpikePredicted,
                });
            }
            if matches!(c.health, HealthState::Degraded | HealthState::Recovering) {
                out.push(Demotion {
                    provider: c.provider.clone(),
                    reason: DemotionReason::Degraded,
                });
            }
        }
        out
    }
}

/// Ranks the providers of an operation's fallback chain.
///
/// Reads rate and health state but never mutates it, so two calls with no
/// intervening state change return the same order.
pub struct LoadBalancer {
    routing: RoutingTable,
    providers: HashMap<String, ProviderConfig>,
    weights: ScoringWeights,
    limiter: Arc<RateLimiter>,
    health: Arc<HealthMonitor>,
    registered: Option<HashSet<String>>,
}

impl LoadBalancer {
    pub fn new(
        routing: RoutingTable,
        providers: &[ProviderConfig],
        weights: ScoringWeights,
        limiter: Arc<RateLimiter>,
        health: Arc<HealthMonitor>,
    ) -> Self {
        Self {
            routing,
            providers: providers
                .iter()
                .map(|p| (p.name.clone(), p.clone()))
                .collect(),
            weights,
            limiter,
            health,
            registered: None,
        }
    }

    /// Restrict ranking to providers that have a registered capability.
    pub fn with_registered<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.registered = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn routing(&self) -> &RoutingTable {
        &self.routing
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    /// Rank the fallback chain of `operation`, honouring `hint`.
    pub fn rank(
        &self,
        operation: &OperationKind,
        hint: Option<&RoutingHint>,
    ) -> Result<Ranking, OrchestratorError> {
        let chain = self
            .routing
            .chain(operation)
            .ok_or_else(|| OrchestratorError::NoRoute(operation.clone()))?;

        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        let mut excluded = Vec::new();

        for (chain_index, name) in chain.iter().enumerate() {
            if !seen.insert(name.as_str()) {
                continue;
            }
            let exclude = |reason| Exclusion {
                provider: name.clone(),
                reason,
            };
            if hint.is_some_and(|h| h.is_excluded(name)) {
                excluded.push(exclude(ExclusionReason::ExcludedByHint));
                continue;
            }
            if self.registered.as_ref().is_some_and(|r| !r.contains(name)) {
                excluded.push(exclude(ExclusionReason::NotRegistered));
                continue;
            }
            let Some(config) = self.providers.get(name) else {
                excluded.push(exclude(ExclusionReason::NotRegistered));
                continue;
            };
            if !config.enabled {
                excluded.push(exclude(ExclusionReason::Disabled));
                continue;
            }
            let health = self.health.state(name);
            let include_unavailable = hint.is_some_and(|h| h.include_unavailable);
            if !health.is_routable() && !include_unavailable {
                excluded.push(exclude(ExclusionReason::Unavailable));
                continue;
            }

            let preferred = hint
                .and_then(|h| h.prefer.as_deref())
                .is_some_and(|p| p == name);
            candidates.push(self.score(name, config, health, chain_index, preferred));
        }

        candidates.sort_by(|a, b| {
            a.partition
                .cmp(&b.partition)
                .then_with(|| b.preferred.cmp(&a.preferred))
                .then_with(|| b.score.total_cmp(&a.score))
                .then_with(|| a.chain_index.cmp(&b.chain_index))
        });

        tracing::debug!(
            %operation,
            order = ?candidates.iter().map(|c| c.provider.as_str()).collect::<Vec<_>>(),
            excluded = excluded.len(),
            "ranked providers"
        );

        Ok(Ranking {
            operation: operation.clone(),
            candidates,
            excluded,
        })
    }

    fn score(
        &self,
        name: &str,
        config: &ProviderConfig,
        health: HealthState,
        chain_index: usize,
        preferred: bool,
    ) -> ScoredCandidate {
        let w = &self.weights;
        let max_usage = self.limiter.max_usage_fraction(name);
        let spike_predicted = self.limiter.is_spike_predicted(name);
        let snapshot = self.health.health(name);
        let avg_latency_ms = snapshot.as_ref().and_then(|s| s.avg_latency_ms);
        let success_rate = snapshot.as_ref().map_or(1.0, |s| s.recent_success_rate);

        let mut headroom = 1.0 - max_usage;
        let mut penalty = 0.0;
        if spike_predicted {
            let reduced = (headroom - w.spike_penalty).max(0.0);
            penalty += w.rate_headroom * (headroom - reduced);
            headroom = reduced;
        }
        let health_penalty = if matches!(health, HealthState::Degraded | HealthState::Recovering) {
            w.degraded_penalty
        } else {
            0.0
        };
        penalty += health_penalty;

        let normalized_latency = avg_latency_ms.map_or(UNKNOWN_NORMALIZED_LATENCY, |ms| {
            (ms / w.latency_ceiling_ms).clamp(0.0, 1.0)
        });

        let breakdown = ScoreBreakdown {
            rate_headroom: w.rate_headroom * headroom,
            latency: w.latency * (1.0 - normalized_latency),
            success_rate: w.success_rate * success_rate,
            priority: w.priority * config.priority,
            penalty,
        };
        let score = breakdown.rate_headroom
            + breakdown.latency
            + breakdown.success_rate
            + breakdown.priority
            - health_penalty;

        let partition = if !health.is_routable() {
            Partition::Unavailable
        } else if max_usage >= w.near_limit_threshold {
            Partition::NearLimit
        } else {
            Partition::Normal
        };

        ScoredCandidate {
            provider: name.to_string(),
            score,
            partition,
            breakdown,
            max_usage,
            spike_predicted,
            health,
            avg_latency_ms,
            preferred,
            chain_index,
        }
    }
}

impl std::fmt::Debug for LoadBalancer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadBalancer")
            .field("routing", &self.routing)
            .field("weights", &self.weights)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::event::EventBus;
    use std::collections::BTreeMap;
    use std::time::Duration;
    use switchyard_types::config::{HealthConfig, SpikeConfig};
    use switchyard_types::provider::{RateWindow, WindowLimit};

    struct Fixture {
        balancer: LoadBalancer,
        limiter: Arc<RateLimiter>,
        health: Arc<HealthMonitor>,
        clock: Arc<ManualClock>,
    }

    fn fixture(providers: Vec<ProviderConfig>, chain: &[&str]) -> Fixture {
        let clock = Arc::new(ManualClock::new());
        let limiter = Arc::new(RateLimiter::new(
            &providers,
            SpikeConfig::default(),
            Duration::from_secs(30),
            clock.clone(),
        ));
        let health = Arc::new(HealthMonitor::new(
            providers.iter().map(|p| p.name.clone()),
            HealthConfig::default(),
            clock.clone(),
            EventBus::new(16),
        ));
        let mut rules = BTreeMap::new();
        rules.insert(
            OperationKind::GetMarketData,
            chain.iter().map(|s| s.to_string()).collect(),
        );
        let balancer = LoadBalancer::new(
            RoutingTable::new(rules),
            &providers,
            ScoringWeights::default(),
            limiter.clone(),
            health.clone(),
        );
        Fixture {
            balancer,
            limiter,
            health,
            clock,
        }
    }

    fn per_second(name: &str, max: u32) -> ProviderConfig {
        ProviderConfig::new(name, vec![WindowLimit::new(RateWindow::Second, max)])
    }

    fn order(f: &Fixture, hint: Option<&RoutingHint>) -> Vec<String> {
        f.balancer
            .rank(&OperationKind::GetMarketData, hint)
            .unwrap()
            .providers()
            .into_iter()
            .map(String::from)
            .collect()
    }

    #[test]
    fn identical_providers_keep_chain_order() {
        let f = fixture(vec![per_second("a", 10), per_second("b", 10)], &["a", "b"]);
        assert_eq!(order(&f, None), vec!["a", "b"]);
        let f = fixture(vec![per_second("a", 10), per_second("b", 10)], &["b", "a"]);
        assert_eq!(order(&f, None), vec!["b", "a"]);
    }

    #[test]
    fn near_limit_provider_ranks_last_regardless_of_score() {
        let f = fixture(
            vec![
                per_second("a", 10).with_priority(1.0),
                per_second("b", 50).with_priority(0.0),
            ],
            &["a", "b"],
        );
        for _ in 0..9 {
            f.limiter.record("a");
        }
        for _ in 0..5 {
            f.limiter.record("b");
        }
        // Make b look much worse on every other axis.
        f.health.record_probe("a", &switchyard_types::health::ProbeOutcome::Healthy, Duration::from_millis(5));
        f.health.record_success("b", Duration::from_millis(1900));
        f.health.record_failure("b", "x");
        f.health.record_failure("b", "x");

        let ranking = f.balancer.rank(&OperationKind::GetMarketData, None).unwrap();
        assert_eq!(ranking.providers(), vec!["b", "a"]);
        assert_eq!(ranking.candidates[1].partition, Partition::NearLimit);
        assert!(ranking.candidates[1].max_usage >= 0.8);
        assert!(ranking
            .demotions()
            .iter()
            .any(|d| d.provider == "a" && d.reason == DemotionReason::NearLimit));
    }

    #[test]
    fn unavailable_provider_is_excluded() {
        let f = fixture(vec![per_second("a", 10), per_second("b", 10)], &["a", "b"]);
        f.health.set_state("a", HealthState::Unavailable, "test");

        let ranking = f.balancer.rank(&OperationKind::GetMarketData, None).unwrap();
        assert_eq!(ranking.providers(), vec!["b"]);
        assert_eq!(ranking.excluded.len(), 1);
        assert_eq!(ranking.excluded[0].reason, ExclusionReason::Unavailable);
    }

    #[test]
    fn include_unavailable_places_it_last() {
        let f = fixture(
            vec![per_second("a", 10).with_priority(1.0), per_second("b", 10)],
            &["a", "b"],
        );
        f.health.set_state("a", HealthState::Unavailable, "test");
        for _ in 0..9 {
            f.limiter.record("b");
        }
        let hint = RoutingHint {
            include_unavailable: true,
            ..RoutingHint::default()
        };
        assert_eq!(order(&f, Some(&hint)), vec!["b", "a"]);
    }

    #[test]
    fn degraded_provider_scores_lower() {
        let f = fixture(vec![per_second("a", 10), per_second("b", 10)], &["a", "b"]);
        f.health.set_state("a", HealthState::Degraded, "test");
        let ranking = f.balancer.rank(&OperationKind::GetMarketData, None).unwrap();
        assert_eq!(ranking.providers(), vec!["b", "a"]);
        assert!(ranking.candidates[1].breakdown.penalty > 0.0);
    }

    #[test]
    fn predicted_spike_demotes_within_partition() {
        let f = fixture(vec![per_second("a", 10), per_second("b", 10)], &["a", "b"]);
        for burst in [2, 4, 7] {
            f.clock.advance(Duration::from_secs(1));
            for _ in 0..burst {
                f.limiter.record("a");
            }
            f.limiter.sample_all();
        }
        // a sits at 70%: below the hard threshold but trending up.
        let ranking = f.balancer.rank(&OperationKind::GetMarketData, None).unwrap();
        assert_eq!(ranking.providers(), vec!["b", "a"]);
        let a = &ranking.candidates[1];
        assert!(a.spike_predicted);
        assert_eq!(a.partition, Partition::Normal);
        assert!(ranking
            .demotions()
            .iter()
            .any(|d| d.provider == "a" && d.reason == DemotionReason::SpikePredicted));
    }

    #[test]
    fn hint_prefers_and_excludes() {
        let f = fixture(
            vec![per_second("a", 10), per_second("b", 10), per_second("c", 10)],
            &["a", "b", "c"],
        );
        assert_eq!(
            order(&f, Some(&RoutingHint::prefer("c"))),
            vec!["c", "a", "b"]
        );
        assert_eq!(order(&f, Some(&RoutingHint::excluding(["a"]))), vec!["b", "c"]);
    }

    #[test]
    fn preference_does_not_cross_partitions() {
        let f = fixture(vec![per_second("a", 10), per_second("b", 10)], &["a", "b"]);
        for _ in 0..8 {
            f.limiter.record("b");
        }
        assert_eq!(order(&f, Some(&RoutingHint::prefer("b"))), vec!["a", "b"]);
    }

    #[test]
    fn ranking_is_deterministic() {
        let f = fixture(
            vec![
                per_second("a", 10),
                per_second("b", 20).with_priority(0.9),
                per_second("c", 5),
            ],
            &["a", "b", "c"],
        );
        f.limiter.record("a");
        f.limiter.record("c");
        f.health.record_success("b", Duration::from_millis(300));
        let first = order(&f, None);
        for _ in 0..10 {
            assert_eq!(order(&f, None), first);
        }
    }

    #[test]
    fn duplicate_and_disabled_chain_entries() {
        let mut disabled = per_second("c", 10);
        disabled.enabled = false;
        let f = fixture(
            vec![per_second("a", 10), per_second("b", 10), disabled],
            &["a", "b", "a", "c", "ghost"],
        );
        let ranking = f.balancer.rank(&OperationKind::GetMarketData, None).unwrap();
        assert_eq!(ranking.providers(), vec!["a", "b"]);
        let reasons: Vec<ExclusionReason> = ranking.excluded.iter().map(|e| e.reason).collect();
        assert_eq!(
            reasons,
            vec![ExclusionReason::Disabled, ExclusionReason::NotRegistered]
        );
    }

    #[test]
    fn unknown_operation_has_no_route() {
        let f = fixture(vec![per_second("a", 10)], &["a"]);
        assert!(matches!(
            f.balancer.rank(&OperationKind::PlaceOrder, None),
            Err(OrchestratorError::NoRoute(OperationKind::PlaceOrder))
        ));
    }

    #[test]
    fn registered_filter_excludes_missing_capabilities() {
        let f = fixture(vec![per_second("a", 10), per_second("b", 10)], &["a", "b"]);
        let balancer = f.balancer.with_registered(["b"]);
        let ranking = balancer.rank(&OperationKind::GetMarketData, None).unwrap();
        assert_eq!(ranking.providers(), vec!["b"]);
    }
}
