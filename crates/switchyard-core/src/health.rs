//! Provider health tracking.
//!
//! Each provider moves through `Available -> Degraded -> Unavailable ->
//! Recovering -> Available`, driven by two inputs:
//!
//! - periodic probes from a background task per provider, and
//! - outcomes of real executions reported by the orchestrator.
//!
//! A failed probe degrades an Available provider immediately; execution
//! failures only do so after `degrade_after_failures` in a row. Unavailable
//! providers are still probed, and the first healthy probe moves them to
//! Recovering. Recovering providers return to Available after
//! `recovery_successes` further successes or a failure-free cool-down, and
//! fall back to Unavailable on any failure.

use std::collections::VecDeque;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use switchyard_types::config::HealthConfig;
use switchyard_types::event::OrchestratorEvent;
use switchyard_types::health::{HealthSnapshot, HealthState, ProbeOutcome};

use crate::clock::Clock;
use crate::event::EventBus;
use crate::provider::{BoxProvider, ProviderRegistry};

/// Where an outcome came from. Probes degrade faster than executions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signal {
    Probe,
    Execution,
}

#[derive(Debug)]
struct Transition {
    from: HealthState,
    to: HealthState,
    reason: String,
}

/// Health tracking for a single provider.
#[derive(Debug, Clone)]
struct ProviderHealth {
    state: HealthState,
    entered_at: Instant,
    avg_latency_ms: Option<f64>,
    last_probe_at: Option<DateTime<Utc>>,
    consecutive_failures: u32,
    consecutive_successes: u32,
    recent: VecDeque<bool>,
    total_calls: u64,
    total_failures: u64,
    last_error: Option<String>,
    uptime_since: Option<DateTime<Utc>>,
}

impl ProviderHealth {
    fn new(now: Instant) -> Self {
        Self {
            state: HealthState::Available,
            entered_at: now,
            avg_latency_ms: None,
            last_probe_at: None,
            consecutive_failures: 0,
            consecutive_successes: 0,
            recent: VecDeque::new(),
            total_calls: 0,
            total_failures: 0,
            last_error: None,
            uptime_since: Some(Utc::now()),
        }
    }

    fn enter(&mut self, to: HealthState, now: Instant, reason: impl Into<String>) -> Transition {
        let from = self.state;
        self.state = to;
        self.entered_at = now;
        self.consecutive_failures = 0;
        self.consecutive_successes = 0;
        self.uptime_since = (to == HealthState::Available).then(Utc::now);
        Transition {
            from,
            to,
            reason: reason.into(),
        }
    }

    fn observe_latency(&mut self, latency: Duration, alpha: f64) {
        let sample = latency.as_secs_f64() * 1000.0;
        self.avg_latency_ms = Some(match self.avg_latency_ms {
            Some(avg) => alpha * sample + (1.0 - alpha) * avg,
            None => sample,
        });
    }

    fn push_outcome(&mut self, success: bool, window: usize) {
        self.recent.push_back(success);
        while self.recent.len() > window {
            self.recent.pop_front();
        }
        self.total_calls += 1;
        if !success {
            self.total_failures += 1;
        }
    }

    fn on_success(&mut self, config: &HealthConfig, now: Instant) -> Option<Transition> {
        self.consecutive_failures = 0;
        self.consecutive_successes += 1;
        match self.state {
            HealthState::Available => None,
            HealthState::Degraded => Some(self.enter(HealthState::Available, now, "succeeded while degraded")),
            HealthState::Unavailable => Some(self.enter(HealthState::Recovering, now, "first success while unavailable")),
            HealthState::Recovering => {
                let cooled = now.saturating_duration_since(self.entered_at)
                    >= Duration::from_secs(config.recovery_cooldown_secs);
                if self.consecutive_successes >= config.recovery_successes {
                    Some(self.enter(
                        HealthState::Available,
                        now,
                        format!("{} consecutive successes", config.recovery_successes),
                    ))
                } else if cooled {
                    Some(self.enter(HealthState::Available, now, "recovery cool-down elapsed"))
                } else {
                    None
                }
            }
        }
    }

    fn on_failure(
        &mut self,
        config: &HealthConfig,
        signal: Signal,
        error: &str,
        now: Instant,
    ) -> Option<Transition> {
        self.last_error = Some(error.to_string());
        self.consecutive_successes = 0;
        self.consecutive_failures += 1;
        match self.state {
            HealthState::Available => {
                if signal == Signal::Probe {
                    Some(self.enter(HealthState::Degraded, now, format!("probe failed: {error}")))
                } else if self.consecutive_failures >= config.degrade_after_failures {
                    Some(self.enter(
                        HealthState::Degraded,
                        now,
                        format!("{} consecutive failed executions", config.degrade_after_failures),
                    ))
                } else {
                    None
                }
            }
            HealthState::Degraded => {
                (self.consecutive_failures >= config.unavailable_after_failures).then(|| {
                    self.enter(
                        HealthState::Unavailable,
                        now,
                        format!("still failing while degraded: {error}"),
                    )
                })
            }
            HealthState::Unavailable => None,
            HealthState::Recovering => Some(self.enter(
                HealthState::Unavailable,
                now,
                format!("failed while recovering: {error}"),
            )),
        }
    }

    fn snapshot(&self, provider: &str) -> HealthSnapshot {
        let recent_success_rate = if self.recent.is_empty() {
            1.0
        } else {
            self.recent.iter().filter(|ok| **ok).count() as f64 / self.recent.len() as f64
        };
        HealthSnapshot {
            provider: provider.to_string(),
            state: self.state,
            avg_latency_ms: self.avg_latency_ms,
            last_probe_at: self.last_probe_at,
            consecutive_failures: self.consecutive_failures,
            consecutive_successes: self.consecutive_successes,
            recent_success_rate,
            total_calls: self.total_calls,
            total_failures: self.total_failures,
            last_error: self.last_error.clone(),
            uptime_since: self.uptime_since,
        }
    }
}

/// Owner of every provider's health state.
///
/// Mutated only through probe results and execution outcomes; every state
/// change is published as `OrchestratorEvent::HealthChanged`.
pub struct HealthMonitor {
    config: RwLock<HealthConfig>,
    clock: Arc<dyn Clock>,
    events: EventBus,
    providers: DashMap<String, ProviderHealth>,
}

impl HealthMonitor {
    pub fn new<I, S>(providers: I, config: HealthConfig, clock: Arc<dyn Clock>, events: EventBus) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let now = clock.now();
        let map = DashMap::new();
        for name in providers {
            map.insert(name.into(), ProviderHealth::new(now));
        }
        Self {
            config: RwLock::new(config),
            clock,
            events,
            providers: map,
        }
    }

    /// Thresholds currently in force.
    pub fn config(&self) -> HealthConfig {
        self.config
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Swap in new thresholds. Tracked state is kept and judged against the
    /// new values from the next outcome on. Probe cadence changes apply to
    /// probers spawned afterwards.
    pub fn set_config(&self, config: HealthConfig) {
        *self.config.write().unwrap_or_else(|e| e.into_inner()) = config;
    }

    /// Align the tracked set with `providers`. Existing state is kept for
    /// names that remain; new names start Available.
    pub fn sync_providers<S: AsRef<str>>(&self, providers: &[S]) {
        self.providers
            .retain(|name, _| providers.iter().any(|p| p.as_ref() == name.as_str()));
        let now = self.clock.now();
        for name in providers {
            self.providers
                .entry(name.as_ref().to_string())
                .or_insert_with(|| ProviderHealth::new(now));
        }
    }

    /// Current state. Untracked providers are reported Available.
    pub fn state(&self, provider: &str) -> HealthState {
        self.providers
            .get(provider)
            .map_or(HealthState::Available, |h| h.state)
    }

    pub fn health(&self, provider: &str) -> Option<HealthSnapshot> {
        self.providers.get(provider).map(|h| h.snapshot(provider))
    }

    /// Snapshots of every tracked provider, sorted by name.
    pub fn snapshots(&self) -> Vec<HealthSnapshot> {
        let mut all: Vec<HealthSnapshot> = self
            .providers
            .iter()
            .map(|entry| entry.value().snapshot(entry.key()))
            .collect();
        all.sort_by(|a, b| a.provider.cmp(&b.provider));
        all
    }

    /// Apply the result of one probe.
    pub fn record_probe(&self, provider: &str, outcome: &ProbeOutcome, latency: Duration) {
        let config = self.config();
        let now = self.clock.now();
        let transition = {
            let Some(mut health) = self.providers.get_mut(provider) else {
                return;
            };
            health.last_probe_at = Some(Utc::now());
            match outcome {
                ProbeOutcome::Healthy => {
                    health.observe_latency(latency, config.latency_alpha);
                    health.on_success(&config, now)
                }
                ProbeOutcome::Unhealthy { reason } => {
                    health.on_failure(&config, Signal::Probe, reason, now)
                }
            }
        };
        self.announce(provider, transition);
    }

    /// Report a successful execution.
    pub fn record_success(&self, provider: &str, latency: Duration) {
        let config = self.config();
        let now = self.clock.now();
        let transition = {
            let Some(mut health) = self.providers.get_mut(provider) else {
                return;
            };
            health.push_outcome(true, config.success_window);
            health.observe_latency(latency, config.latency_alpha);
            health.on_success(&config, now)
        };
        self.announce(provider, transition);
    }

    /// Report a failed execution.
    pub fn record_failure(&self, provider: &str, error: &str) {
        let config = self.config();
        let now = self.clock.now();
        let transition = {
            let Some(mut health) = self.providers.get_mut(provider) else {
                return;
            };
            health.push_outcome(false, config.success_window);
            health.on_failure(&config, Signal::Execution, error, now)
        };
        self.announce(provider, transition);
    }

    /// Force a provider into `state`, e.g. from an operator command.
    pub fn set_state(&self, provider: &str, state: HealthState, reason: &str) {
        let now = self.clock.now();
        let transition = {
            let Some(mut health) = self.providers.get_mut(provider) else {
                return;
            };
            (health.state != state).then(|| health.enter(state, now, reason))
        };
        self.announce(provider, transition);
    }

    /// Seed a provider from a persisted snapshot. Unavailable is restored as
    /// Recovering so that probes confirm the provider before full use.
    pub fn restore(&self, snapshot: &HealthSnapshot) {
        let now = self.clock.now();
        if let Some(mut health) = self.providers.get_mut(&snapshot.provider) {
            health.state = match snapshot.state {
                HealthState::Unavailable => HealthState::Recovering,
                other => other,
            };
            health.entered_at = now;
            health.avg_latency_ms = snapshot.avg_latency_ms;
            health.last_probe_at = snapshot.last_probe_at;
            health.total_calls = snapshot.total_calls;
            health.total_failures = snapshot.total_failures;
            health.last_error = snapshot.last_error.clone();
            health.uptime_since = (health.state == HealthState::Available)
                .then_some(snapshot.uptime_since)
                .flatten();
        }
    }

    /// Probe one provider with the configured timeout and apply the result.
    pub async fn probe(&self, provider: &BoxProvider) -> ProbeOutcome {
        let timeout = Duration::from_millis(self.config().probe_timeout_ms);
        let started = tokio::time::Instant::now();
        let outcome = match tokio::time::timeout(timeout, provider.probe(timeout)).await {
            Ok(outcome) => outcome,
            Err(_) => ProbeOutcome::unhealthy(format!("probe timed out after {}ms", timeout.as_millis())),
        };
        self.record_probe(provider.name(), &outcome, started.elapsed());
        outcome
    }

    /// Probe every provider in `registry` concurrently, once.
    pub async fn probe_all(&self, registry: &ProviderRegistry) {
        let probes = registry.iter().map(|(_, provider)| self.probe(provider));
        futures_util::future::join_all(probes).await;
    }

    /// Spawn one prober task per provider onto `tasks`.
    ///
    /// Each prober ticks independently, so a slow or dead provider only
    /// delays its own probes. All probers stop when `cancel` fires.
    pub fn spawn_probers(
        self: &Arc<Self>,
        registry: &ProviderRegistry,
        cancel: &CancellationToken,
        tasks: &mut JoinSet<()>,
    ) {
        let interval = Duration::from_secs(self.config().probe_interval_secs);
        for (name, provider) in registry.iter() {
            let monitor = Arc::clone(self);
            let provider = Arc::clone(provider);
            let cancel = cancel.clone();
            let name = name.to_string();
            tasks.spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = ticker.tick() => {
                            let outcome = tokio::select! {
                                _ = cancel.cancelled() => break,
                                outcome = monitor.probe(&provider) => outcome,
                            };
                            tracing::trace!(provider = %name, healthy = outcome.is_healthy(), "probe finished");
                        }
                    }
                }
                tracing::debug!(provider = %name, "prober stopped");
            });
        }
    }

    fn announce(&self, provider: &str, transition: Option<Transition>) {
        let Some(Transition { from, to, reason }) = transition else {
            return;
        };
        match to {
            HealthState::Available | HealthState::Recovering => {
                tracing::info!(provider, %from, %to, %reason, "provider health changed");
            }
            HealthState::Degraded | HealthState::Unavailable => {
                tracing::warn!(provider, %from, %to, %reason, "provider health changed");
            }
        }
        self.events.publish(OrchestratorEvent::HealthChanged {
            provider: provider.to_string(),
            from,
            to,
            reason,
        });
    }
}

impl std::fmt::Debug for HealthMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthMonitor")
            .field("providers", &self.providers.len())
            .field("config", &self.config())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::provider::Provider;
    use crate::provider::Params;
    use std::future::Future;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use switchyard_types::error::ProviderError;
    use switchyard_types::operation::OperationKind;

    fn monitor(names: &[&str]) -> (HealthMonitor, Arc<ManualClock>, EventBus) {
        let clock = Arc::new(ManualClock::new());
        let bus = EventBus::new(64);
        let monitor = HealthMonitor::new(
            names.iter().copied(),
            HealthConfig::default(),
            clock.clone(),
            bus.clone(),
        );
        (monitor, clock, bus)
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn starts_available_with_neutral_stats() {
        let (monitor, _, _) = monitor(&["a"]);
        let snap = monitor.health("a").unwrap();
        assert_eq!(snap.state, HealthState::Available);
        assert_eq!(snap.recent_success_rate, 1.0);
        assert!(snap.avg_latency_ms.is_none());
        assert!(snap.uptime_since.is_some());
        assert!(monitor.health("ghost").is_none());
        assert_eq!(monitor.state("ghost"), HealthState::Available);
    }

    #[test]
    fn probe_failure_degrades_immediately() {
        let (monitor, _, bus) = monitor(&["a"]);
        let mut rx = bus.subscribe();

        monitor.record_probe("a", &ProbeOutcome::unhealthy("503"), ms(10));

        assert_eq!(monitor.state("a"), HealthState::Degraded);
        let event = rx.try_recv().unwrap();
        assert!(matches!(
            event,
            OrchestratorEvent::HealthChanged {
                from: HealthState::Available,
                to: HealthState::Degraded,
                ..
            }
        ));
        assert!(monitor.health("a").unwrap().last_probe_at.is_some());
    }

    #[test]
    fn execution_failures_degrade_after_threshold() {
        let (monitor, _, _) = monitor(&["a"]);
        monitor.record_failure("a", "boom");
        monitor.record_failure("a", "boom");
        assert_eq!(monitor.state("a"), HealthState::Available);
        monitor.record_failure("a", "boom");
        assert_eq!(monitor.state("a"), HealthState::Degraded);
        assert_eq!(monitor.health("a").unwrap().last_error.as_deref(), Some("boom"));
    }

    #[test]
    fn success_resets_failure_streak() {
        let (monitor, _, _) = monitor(&["a"]);
        monitor.record_failure("a", "boom");
        monitor.record_failure("a", "boom");
        monitor.record_success("a", ms(20));
        monitor.record_failure("a", "boom");
        monitor.record_failure("a", "boom");
        assert_eq!(monitor.state("a"), HealthState::Available);
    }

    #[test]
    fn full_cycle_through_all_states() {
        let (monitor, _, bus) = monitor(&["a"]);
        let mut rx = bus.subscribe();
        let down = ProbeOutcome::unhealthy("connection refused");

        monitor.record_probe("a", &down, ms(0));
        assert_eq!(monitor.state("a"), HealthState::Degraded);
        monitor.record_probe("a", &down, ms(0));
        monitor.record_probe("a", &down, ms(0));
        assert_eq!(monitor.state("a"), HealthState::Unavailable);
        assert!(monitor.health("a").unwrap().uptime_since.is_none());

        // Still probed while unavailable; first success starts recovery.
        monitor.record_probe("a", &ProbeOutcome::Healthy, ms(40));
        assert_eq!(monitor.state("a"), HealthState::Recovering);

        for _ in 0..2 {
            monitor.record_probe("a", &ProbeOutcome::Healthy, ms(40));
            assert_eq!(monitor.state("a"), HealthState::Recovering);
        }
        monitor.record_probe("a", &ProbeOutcome::Healthy, ms(40));
        assert_eq!(monitor.state("a"), HealthState::Available);

        let mut path = Vec::new();
        while let Ok(OrchestratorEvent::HealthChanged { to, .. }) = rx.try_recv() {
            path.push(to);
        }
        assert_eq!(
            path,
            vec![
                HealthState::Degraded,
                HealthState::Unavailable,
                HealthState::Recovering,
                HealthState::Available
            ]
        );
    }

    #[test]
    fn failure_while_recovering_returns_to_unavailable() {
        let (monitor, _, _) = monitor(&["a"]);
        monitor.set_state("a", HealthState::Recovering, "test");
        monitor.record_failure("a", "timeout");
        assert_eq!(monitor.state("a"), HealthState::Unavailable);
    }

    #[test]
    fn cool_down_completes_recovery() {
        let (monitor, clock, _) = monitor(&["a"]);
        monitor.set_state("a", HealthState::Unavailable, "test");
        monitor.record_probe("a", &ProbeOutcome::Healthy, ms(5));
        assert_eq!(monitor.state("a"), HealthState::Recovering);

        clock.advance(Duration::from_secs(61));
        monitor.record_probe("a", &ProbeOutcome::Healthy, ms(5));
        assert_eq!(monitor.state("a"), HealthState::Available);
    }

    #[test]
    fn latency_is_exponential_moving_average() {
        let (monitor, _, _) = monitor(&["a"]);
        monitor.record_probe("a", &ProbeOutcome::Healthy, ms(100));
        assert_eq!(monitor.health("a").unwrap().avg_latency_ms, Some(100.0));
        monitor.record_success("a", ms(200));
        // alpha 0.3: 0.3 * 200 + 0.7 * 100
        let avg = monitor.health("a").unwrap().avg_latency_ms.unwrap();
        assert!((avg - 130.0).abs() < 1e-6);
    }

    #[test]
    fn success_rate_uses_recent_window() {
        let (monitor, _, _) = monitor(&["a"]);
        for _ in 0..50 {
            monitor.record_failure("a", "x");
        }
        monitor.set_state("a", HealthState::Available, "reset");
        for _ in 0..25 {
            monitor.record_success("a", ms(1));
        }
        let snap = monitor.health("a").unwrap();
        assert!((snap.recent_success_rate - 0.5).abs() < 1e-9);
        assert_eq!(snap.total_calls, 75);
        assert_eq!(snap.total_failures, 50);
    }

    #[test]
    fn restore_treats_unavailable_as_recovering() {
        let (monitor, _, _) = monitor(&["a"]);
        let mut snap = monitor.health("a").unwrap();
        snap.state = HealthState::Unavailable;
        snap.total_calls = 10;
        snap.avg_latency_ms = Some(42.0);
        monitor.restore(&snap);

        let restored = monitor.health("a").unwrap();
        assert_eq!(restored.state, HealthState::Recovering);
        assert_eq!(restored.total_calls, 10);
        assert_eq!(restored.avg_latency_ms, Some(42.0));
    }

    #[test]
    fn sync_providers_keeps_surviving_state() {
        let (monitor, _, _) = monitor(&["a", "b"]);
        monitor.set_state("a", HealthState::Degraded, "test");
        monitor.sync_providers(&["a", "c"]);
        let names: Vec<String> = monitor.snapshots().into_iter().map(|s| s.provider).collect();
        assert_eq!(names, vec!["a", "c"]);
        assert_eq!(monitor.state("a"), HealthState::Degraded);
        assert_eq!(monitor.state("c"), HealthState::Available);
    }

    #[test]
    fn new_thresholds_apply_to_next_outcome() {
        let (monitor, _, _) = monitor(&["a"]);
        monitor.record_failure("a", "boom");
        assert_eq!(monitor.state("a"), HealthState::Available);

        monitor.set_config(HealthConfig {
            degrade_after_failures: 2,
            ..HealthConfig::default()
        });
        assert_eq!(monitor.config().degrade_after_failures, 2);

        // The streak built under the old thresholds still counts.
        monitor.record_failure("a", "boom");
        assert_eq!(monitor.state("a"), HealthState::Degraded);
    }

    struct FlakyProbe {
        name: &'static str,
        healthy: AtomicBool,
        probes: AtomicU32,
        hang: bool,
    }

    impl Provider for FlakyProbe {
        fn name(&self) -> &str {
            self.name
        }

        fn invoke(
            &self,
            _operation: &OperationKind,
            _params: &Params,
            _timeout: Duration,
        ) -> impl Future<Output = Result<serde_json::Value, ProviderError>> + Send {
            async { Ok(serde_json::Value::Null) }
        }

        fn probe(&self, _timeout: Duration) -> impl Future<Output = ProbeOutcome> + Send {
            self.probes.fetch_add(1, Ordering::SeqCst);
            let healthy = self.healthy.load(Ordering::SeqCst);
            let hang = self.hang;
            async move {
                if hang {
                    std::future::pending::<()>().await;
                }
                if healthy {
                    ProbeOutcome::Healthy
                } else {
                    ProbeOutcome::unhealthy("down")
                }
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn probe_timeout_counts_as_unhealthy() {
        let (monitor, _, _) = monitor(&["stuck"]);
        let provider = BoxProvider::new(FlakyProbe {
            name: "stuck",
            healthy: AtomicBool::new(true),
            probes: AtomicU32::new(0),
            hang: true,
        });

        let outcome = monitor.probe(&provider).await;
        assert!(!outcome.is_healthy());
        assert_eq!(monitor.state("stuck"), HealthState::Degraded);
    }

    #[tokio::test(start_paused = true)]
    async fn probers_run_independently_and_stop_on_cancel() {
        let (monitor, _, _) = monitor(&["stuck", "ok"]);
        let monitor = Arc::new(monitor);
        let registry = ProviderRegistry::new()
            .with(BoxProvider::new(FlakyProbe {
                name: "stuck",
                healthy: AtomicBool::new(true),
                probes: AtomicU32::new(0),
                hang: true,
            }))
            .with(BoxProvider::new(FlakyProbe {
                name: "ok",
                healthy: AtomicBool::new(false),
                probes: AtomicU32::new(0),
                hang: false,
            }));

        let cancel = CancellationToken::new();
        let mut tasks = JoinSet::new();
        monitor.spawn_probers(&registry, &cancel, &mut tasks);

        // First tick fires immediately; the healthy-flag provider fails fast
        // even though the other prober is stuck until its timeout.
        tokio::time::sleep(ms(100)).await;
        assert_eq!(monitor.state("ok"), HealthState::Degraded);
        assert_eq!(monitor.state("stuck"), HealthState::Available);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(monitor.state("stuck"), HealthState::Degraded);

        cancel.cancel();
        while tasks.join_next().await.is_some() {}
    }
}
