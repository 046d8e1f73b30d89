//! Dashboard-facing summaries derived from the orchestrator event stream.
//!
//! The aggregator only ever reads: it consumes `OrchestratorEvent`s from the
//! bus and queries the rate limiter and health monitor on demand. Nothing it
//! computes is fed back into routing.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use switchyard_types::analytics::{
    LoadBalancingInsights, OptimizationSuggestion, ProviderActivity, RateLimitAnalytics, Severity,
};
use switchyard_types::event::{DemotionReason, OrchestratorEvent};
use switchyard_types::health::HealthState;
use switchyard_types::record::{AttemptOutcome, ErrorKind};

use crate::clock::Clock;
use crate::health::HealthMonitor;
use crate::rate_limiter::RateLimiter;

/// Ranking passes required before demotion ratios are trusted.
const MIN_RANK_APPEARANCES: u64 = 10;
/// Share of ranking passes that must demote a provider to raise a suggestion.
const PERSISTENT_DEMOTION_RATIO: f64 = 0.5;
const FLAP_WINDOW: Duration = Duration::from_secs(600);
const FLAP_TRANSITIONS: usize = 4;
const MIN_ATTEMPTS_FOR_SUCCESS_RATE: u64 = 10;
const LOW_SUCCESS_RATE: f64 = 0.8;
const CRITICAL_SUCCESS_RATE: f64 = 0.5;
const HIGH_LATENCY_MS: f64 = 1_000.0;
const HOT_USAGE: f64 = 0.9;
const MIN_SUCCESSES_FOR_SKEW: u64 = 20;
const SKEW_EFFICIENCY: f64 = 0.5;
/// Smoothing factor for the execution latency average.
const LATENCY_ALPHA: f64 = 0.2;

#[derive(Debug, Default)]
struct Activity {
    counters: ProviderActivity,
    transitions: VecDeque<Instant>,
}

/// Aggregates execution, ranking and health events into advisory analytics.
pub struct AnalyticsAggregator {
    limiter: Arc<RateLimiter>,
    health: Arc<HealthMonitor>,
    clock: Arc<dyn Clock>,
    activity: Mutex<HashMap<String, Activity>>,
    lagged: Mutex<u64>,
}

impl AnalyticsAggregator {
    pub fn new(limiter: Arc<RateLimiter>, health: Arc<HealthMonitor>, clock: Arc<dyn Clock>) -> Self {
        Self {
            limiter,
            health,
            clock,
            activity: Mutex::new(HashMap::new()),
            lagged: Mutex::new(0),
        }
    }

    /// Fold one event into the running counters.
    pub fn ingest(&self, event: &OrchestratorEvent) {
        let now = self.clock.now();
        let mut activity = self.activity.lock().unwrap_or_else(|e| e.into_inner());
        match event {
            OrchestratorEvent::Execution(record) => {
                let entry = activity.entry(record.provider.clone()).or_default();
                let counters = &mut entry.counters;
                match record.outcome {
                    AttemptOutcome::Success => counters.successes += 1,
                    AttemptOutcome::Failure => {
                        counters.failures += 1;
                        if record.error_kind == Some(ErrorKind::ProviderTimeout) {
                            counters.timeouts += 1;
                        }
                    }
                    AttemptOutcome::Cancelled => counters.cancelled += 1,
                }
                let latency = record.latency_ms as f64;
                counters.avg_latency_ms = Some(match counters.avg_latency_ms {
                    Some(avg) => LATENCY_ALPHA * latency + (1.0 - LATENCY_ALPHA) * avg,
                    None => latency,
                });
            }
            OrchestratorEvent::Ranked {
                order, demotions, ..
            } => {
                for provider in order {
                    activity
                        .entry(provider.clone())
                        .or_default()
                        .counters
                        .rank_appearances += 1;
                }
                for demotion in demotions {
                    let counters = &mut activity.entry(demotion.provider.clone()).or_default().counters;
                    match demotion.reason {
                        DemotionReason::SpikePredicted => counters.spike_demotions += 1,
                        DemotionReason::NearLimit => counters.near_limit_demotions += 1,
                        DemotionReason::Degraded => {}
                    }
                }
            }
            OrchestratorEvent::HealthChanged { provider, .. } => {
                let entry = activity.entry(provider.clone()).or_default();
                entry.counters.health_transitions += 1;
                entry.transitions.push_back(now);
                while entry
                    .transitions
                    .front()
                    .is_some_and(|at| now.saturating_duration_since(*at) > FLAP_WINDOW)
                {
                    entry.transitions.pop_front();
                }
            }
        }
    }

    /// Consume `rx` until `cancel` fires or the bus closes. Events already
    /// queued when cancelled are still folded in.
    pub fn spawn(
        self: &Arc<Self>,
        mut rx: broadcast::Receiver<OrchestratorEvent>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let aggregator = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = rx.recv() => event,
                };
                match event {
                    Ok(event) => aggregator.ingest(&event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "analytics subscriber lagged, events dropped");
                        *aggregator.lagged.lock().unwrap_or_else(|e| e.into_inner()) += skipped;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            while let Ok(event) = rx.try_recv() {
                aggregator.ingest(&event);
            }
            tracing::debug!("analytics subscriber stopped");
        })
    }

    /// Events missed because the subscriber fell behind.
    pub fn lagged_events(&self) -> u64 {
        *self.lagged.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Counters for every provider seen so far, by name.
    pub fn activity(&self) -> BTreeMap<String, ProviderActivity> {
        let activity = self.activity.lock().unwrap_or_else(|e| e.into_inner());
        activity
            .iter()
            .map(|(name, a)| (name.clone(), a.counters.clone()))
            .collect()
    }

    /// Current usage fraction per provider and configured window.
    pub fn rate_limit_analytics(&self) -> RateLimitAnalytics {
        self.limiter.analytics()
    }

    /// Distribution of successful requests across providers.
    ///
    /// Efficiency is `1 - (variance / mean)` of the per-provider shares,
    /// scaled by the largest value that ratio can take for the provider
    /// count. An even split scores 1.0; everything on one provider scores 0.0.
    pub fn load_balancing_insights(&self) -> LoadBalancingInsights {
        let activity = self.activity();
        let mut successes: BTreeMap<String, u64> = self
            .limiter
            .provider_names()
            .into_iter()
            .map(|name| (name, 0))
            .collect();
        for (name, counters) in &activity {
            *successes.entry(name.clone()).or_default() += counters.successes;
        }

        let total: u64 = successes.values().sum();
        let per_provider_share: BTreeMap<String, f64> = successes
            .iter()
            .map(|(name, n)| {
                let share = if total == 0 { 0.0 } else { *n as f64 / total as f64 };
                (name.clone(), share)
            })
            .collect();

        let shares: Vec<f64> = per_provider_share.values().copied().collect();
        LoadBalancingInsights {
            efficiency: efficiency(&shares, total),
            per_provider_share,
            total_successes: total,
        }
    }

    /// Heuristic advice for operators, most severe first.
    pub fn optimization_suggestions(&self) -> Vec<OptimizationSuggestion> {
        let now = self.clock.now();
        let mut out = Vec::new();
        let mut push = |provider: &str, severity: Severity, suggestion: String| {
            out.push(OptimizationSuggestion {
                provider: provider.to_string(),
                suggestion,
                severity,
            });
        };

        {
            let activity = self.activity.lock().unwrap_or_else(|e| e.into_inner());
            for (name, a) in activity.iter() {
                let c = &a.counters;
                if c.rank_appearances >= MIN_RANK_APPEARANCES {
                    let spike_ratio = c.spike_demotions as f64 / c.rank_appearances as f64;
                    if spike_ratio >= PERSISTENT_DEMOTION_RATIO {
                        push(
                            name,
                            Severity::Warning,
                            format!(
                                "{name} is demoted for predicted usage spikes in {:.0}% of rankings; consider raising its configured ceiling",
                                spike_ratio * 100.0
                            ),
                        );
                    }
                    let near_ratio = c.near_limit_demotions as f64 / c.rank_appearances as f64;
                    if near_ratio >= PERSISTENT_DEMOTION_RATIO {
                        push(
                            name,
                            Severity::Warning,
                            format!(
                                "{name} is near its rate limit in {:.0}% of rankings; add capacity or move traffic to other providers",
                                near_ratio * 100.0
                            ),
                        );
                    }
                }

                let recent_flaps = a
                    .transitions
                    .iter()
                    .filter(|at| now.saturating_duration_since(**at) <= FLAP_WINDOW)
                    .count();
                if recent_flaps >= FLAP_TRANSITIONS {
                    push(
                        name,
                        Severity::Warning,
                        format!(
                            "{name} health state is flapping ({recent_flaps} transitions in 10 minutes); investigate"
                        ),
                    );
                }

                if c.attempts() >= MIN_ATTEMPTS_FOR_SUCCESS_RATE {
                    if let Some(rate) = c.success_rate() {
                        if rate < CRITICAL_SUCCESS_RATE {
                            push(
                                name,
                                Severity::Critical,
                                format!("{name} succeeds on only {:.0}% of attempts", rate * 100.0),
                            );
                        } else if rate < LOW_SUCCESS_RATE {
                            push(
                                name,
                                Severity::Warning,
                                format!("{name} success rate is {:.0}%", rate * 100.0),
                            );
                        }
                    }
                }
            }
        }

        for snapshot in self.health.snapshots() {
            if let Some(latency) = snapshot.avg_latency_ms.filter(|ms| *ms > HIGH_LATENCY_MS) {
                push(
                    &snapshot.provider,
                    Severity::Info,
                    format!(
                        "{} averages {latency:.0}ms; consider a lower static priority or a tighter timeout",
                        snapshot.provider
                    ),
                );
            }
            if snapshot.state == HealthState::Unavailable {
                push(
                    &snapshot.provider,
                    Severity::Critical,
                    format!(
                        "{} is unavailable: {}",
                        snapshot.provider,
                        snapshot.last_error.as_deref().unwrap_or("no error recorded")
                    ),
                );
            }
        }

        for (provider, windows) in self.limiter.analytics() {
            if let Some((window, fraction)) = windows
                .iter()
                .filter(|(_, f)| **f >= HOT_USAGE)
                .max_by(|a, b| a.1.total_cmp(b.1))
            {
                push(
                    &provider,
                    Severity::Critical,
                    format!(
                        "{provider} is at {:.0}% of its per-{window} ceiling",
                        fraction * 100.0
                    ),
                );
            }
        }

        let insights = self.load_balancing_insights();
        if insights.total_successes >= MIN_SUCCESSES_FOR_SKEW
            && insights.per_provider_share.len() > 1
            && insights.efficiency < SKEW_EFFICIENCY
        {
            if let Some((top, share)) = insights
                .per_provider_share
                .iter()
                .max_by(|a, b| a.1.total_cmp(b.1))
            {
                push(
                    top,
                    Severity::Info,
                    format!(
                        "{top} serves {:.0}% of successful traffic; load is skewed (efficiency {:.2})",
                        share * 100.0,
                        insights.efficiency
                    ),
                );
            }
        }

        out.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then_with(|| a.provider.cmp(&b.provider))
                .then_with(|| a.suggestion.cmp(&b.suggestion))
        });
        out
    }
}

impl std::fmt::Debug for AnalyticsAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyticsAggregator")
            .field("lagged_events", &self.lagged_events())
            .finish()
    }
}

fn efficiency(shares: &[f64], total: u64) -> f64 {
    let n = shares.len();
    if n <= 1 || total == 0 {
        return 1.0;
    }
    let n_f = n as f64;
    let mean = 1.0 / n_f;
    let variance = shares.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n_f;
    let max_ratio = (n_f - 1.0) / n_f;
    (1.0 - (variance / mean) / max_ratio).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::event::EventBus;
    use chrono::Utc;
    use switchyard_types::config::{HealthConfig, SpikeConfig};
    use switchyard_types::event::Demotion;
    use switchyard_types::operation::OperationKind;
    use switchyard_types::provider::{ProviderConfig, RateWindow, WindowLimit};
    use switchyard_types::record::ExecutionRecord;
    use uuid::Uuid;

    struct Fixture {
        analytics: Arc<AnalyticsAggregator>,
        limiter: Arc<RateLimiter>,
        clock: Arc<ManualClock>,
    }

    fn fixture(names: &[&str]) -> Fixture {
        let clock = Arc::new(ManualClock::new());
        let providers: Vec<ProviderConfig> = names
            .iter()
            .map(|n| ProviderConfig::new(*n, vec![WindowLimit::new(RateWindow::Second, 10)]))
            .collect();
        let limiter = Arc::new(RateLimiter::new(
            &providers,
            SpikeConfig::default(),
            Duration::from_secs(30),
            clock.clone(),
        ));
        let health = Arc::new(HealthMonitor::new(
            names.iter().copied(),
            HealthConfig::default(),
            clock.clone(),
            EventBus::new(16),
        ));
        Fixture {
            analytics: Arc::new(AnalyticsAggregator::new(limiter.clone(), health, clock.clone())),
            limiter,
            clock,
        }
    }

    fn execution(provider: &str, outcome: AttemptOutcome, latency_ms: u64) -> OrchestratorEvent {
        OrchestratorEvent::Execution(ExecutionRecord {
            id: Uuid::now_v7(),
            request_id: Uuid::now_v7(),
            provider: provider.to_string(),
            operation: OperationKind::GetQuote,
            timestamp: Utc::now(),
            latency_ms,
            outcome,
            error_kind: (outcome == AttemptOutcome::Failure).then_some(ErrorKind::ProviderTimeout),
            error_message: None,
            attempt: 1,
        })
    }

    fn ranked(order: &[&str], demotions: Vec<Demotion>) -> OrchestratorEvent {
        OrchestratorEvent::Ranked {
            request_id: Uuid::now_v7(),
            operation: OperationKind::GetQuote,
            order: order.iter().map(|s| s.to_string()).collect(),
            demotions,
        }
    }

    #[test]
    fn usage_round_trips_exactly() {
        let f = fixture(&["p"]);
        for _ in 0..7 {
            assert!(f.limiter.try_acquire("p"));
        }
        let analytics = f.analytics.rate_limit_analytics();
        assert!((analytics["p"][&RateWindow::Second] - 0.7).abs() < 1e-12);
    }

    #[test]
    fn even_split_is_fully_efficient() {
        let f = fixture(&["a", "b"]);
        for _ in 0..5 {
            f.analytics.ingest(&execution("a", AttemptOutcome::Success, 10));
            f.analytics.ingest(&execution("b", AttemptOutcome::Success, 10));
        }
        let insights = f.analytics.load_balancing_insights();
        assert!((insights.efficiency - 1.0).abs() < 1e-9);
        assert_eq!(insights.total_successes, 10);
        assert!((insights.per_provider_share["a"] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn single_provider_traffic_has_zero_efficiency() {
        let f = fixture(&["a", "b", "c"]);
        for _ in 0..9 {
            f.analytics.ingest(&execution("a", AttemptOutcome::Success, 10));
        }
        let insights = f.analytics.load_balancing_insights();
        assert!(insights.efficiency.abs() < 1e-9);
        assert_eq!(insights.per_provider_share["c"], 0.0);
    }

    #[test]
    fn efficiency_without_traffic_is_neutral() {
        let f = fixture(&["a", "b"]);
        assert_eq!(f.analytics.load_balancing_insights().efficiency, 1.0);
        assert_eq!(efficiency(&[1.0], 4), 1.0);
    }

    #[test]
    fn partial_skew_is_between_bounds() {
        let e = efficiency(&[0.75, 0.25], 4);
        // variance 0.0625, mean 0.5, max ratio 0.5
        assert!((e - 0.75).abs() < 1e-9);
    }

    #[test]
    fn counters_track_outcomes() {
        let f = fixture(&["a"]);
        f.analytics.ingest(&execution("a", AttemptOutcome::Success, 100));
        f.analytics.ingest(&execution("a", AttemptOutcome::Failure, 200));
        f.analytics.ingest(&execution("a", AttemptOutcome::Cancelled, 50));
        let activity = &f.analytics.activity()["a"];
        assert_eq!(activity.successes, 1);
        assert_eq!(activity.failures, 1);
        assert_eq!(activity.timeouts, 1);
        assert_eq!(activity.cancelled, 1);
        assert!(activity.avg_latency_ms.is_some());
    }

    #[test]
    fn persistent_spike_demotion_suggests_raising_ceiling() {
        let f = fixture(&["a", "b"]);
        for i in 0..12 {
            let demotions = if i % 4 == 0 {
                vec![]
            } else {
                vec![Demotion {
                    provider: "a".to_string(),
                    reason: DemotionReason::SpikePredicted,
                }]
            };
            f.analytics.ingest(&ranked(&["b", "a"], demotions));
        }
        let suggestions = f.analytics.optimization_suggestions();
        assert!(suggestions
            .iter()
            .any(|s| s.provider == "a" && s.suggestion.contains("raising its configured ceiling")));
        assert!(!suggestions.iter().any(|s| s.provider == "b"));
    }

    #[test]
    fn flapping_is_reported_only_within_window() {
        let f = fixture(&["a"]);
        let flip = |to| OrchestratorEvent::HealthChanged {
            provider: "a".to_string(),
            from: HealthState::Available,
            to,
            reason: "test".to_string(),
        };
        for _ in 0..2 {
            f.analytics.ingest(&flip(HealthState::Degraded));
            f.analytics.ingest(&flip(HealthState::Available));
        }
        let flapping = |f: &Fixture| {
            f.analytics
                .optimization_suggestions()
                .iter()
                .any(|s| s.suggestion.contains("flapping"))
        };
        assert!(flapping(&f));

        f.clock.advance(Duration::from_secs(601));
        assert!(!flapping(&f));
        assert_eq!(f.analytics.activity()["a"].health_transitions, 4);
    }

    #[test]
    fn hot_usage_and_low_success_are_critical_and_sorted_first() {
        let f = fixture(&["a", "b"]);
        for _ in 0..9 {
            f.limiter.record("a");
        }
        for _ in 0..6 {
            f.analytics.ingest(&execution("b", AttemptOutcome::Failure, 10));
        }
        for _ in 0..4 {
            f.analytics.ingest(&execution("b", AttemptOutcome::Success, 10));
        }
        let suggestions = f.analytics.optimization_suggestions();
        assert!(suggestions.len() >= 2);
        assert_eq!(suggestions[0].severity, Severity::Critical);
        assert!(suggestions
            .iter()
            .any(|s| s.provider == "a" && s.suggestion.contains("90% of its per-second ceiling")));
        assert!(suggestions
            .iter()
            .any(|s| s.provider == "b" && s.severity == Severity::Critical));
        assert!(suggestions.windows(2).all(|w| w[0].severity >= w[1].severity));
    }

    #[tokio::test]
    async fn subscriber_task_ingests_from_bus() {
        let f = fixture(&["a"]);
        let bus = EventBus::new(16);
        let cancel = CancellationToken::new();
        let handle = f.analytics.spawn(bus.subscribe(), cancel.clone());

        bus.publish(execution("a", AttemptOutcome::Success, 5));
        for _ in 0..50 {
            if f.analytics.activity().get("a").is_some_and(|a| a.successes == 1) {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(f.analytics.activity()["a"].successes, 1);

        cancel.cancel();
        handle.await.unwrap();
    }
}
