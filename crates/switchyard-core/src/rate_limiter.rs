//! Per-provider rate governance over multiple sliding windows.
//!
//! Each provider keeps one `SlidingWindow` per configured ceiling. A window
//! is a queue of timestamped usage samples plus a running total; samples are
//! evicted once they fall entirely outside the window, so the queue never
//! holds anything older than the longest configured window.
//!
//! Samples recorded within `min(window / 64, 1s)` of each other are
//! coalesced into one entry. Eviction uses the entry's *latest* timestamp,
//! which keeps the count conservative: a coalesced entry never drops a unit
//! that is still in the window, and its oldest unit outlives the window by
//! at most one granularity. For a day window that over-count lasts under a
//! second; for a one-second window under 16ms.
//!
//! The limiter also keeps a short trend of max-window usage fractions per
//! provider (sampled by a background task once per second) and projects it
//! forward to predict imminent ceiling hits.

use std::collections::VecDeque;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;

use switchyard_types::analytics::RateLimitAnalytics;
use switchyard_types::config::SpikeConfig;
use switchyard_types::provider::{ProviderConfig, RateWindow, WindowLimit};

use crate::clock::Clock;

/// Number of coalescing buckets per window length.
const BUCKETS_PER_WINDOW: u32 = 64;

/// Upper bound on the coalescing granularity of any window.
const MAX_GRANULARITY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy)]
struct UsageSample {
    first_at: Instant,
    last_at: Instant,
    count: u32,
}

#[derive(Debug, Clone)]
struct SlidingWindow {
    limit: WindowLimit,
    granularity: Duration,
    samples: VecDeque<UsageSample>,
    total: u64,
}

impl SlidingWindow {
    fn new(limit: WindowLimit) -> Self {
        Self {
            limit,
            granularity: (limit.window.duration() / BUCKETS_PER_WINDOW).min(MAX_GRANULARITY),
            samples: VecDeque::new(),
            total: 0,
        }
    }

    fn evict(&mut self, now: Instant) {
        let span = self.limit.window.duration();
        while let Some(front) = self.samples.front() {
            if now.saturating_duration_since(front.last_at) >= span {
                self.total -= u64::from(front.count);
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    fn has_room(&self) -> bool {
        self.total < u64::from(self.limit.max_requests)
    }

    fn record(&mut self, now: Instant) {
        match self.samples.back_mut() {
            Some(last) if now.saturating_duration_since(last.first_at) < self.granularity => {
                last.last_at = now;
                last.count += 1;
            }
            _ => self.samples.push_back(UsageSample {
                first_at: now,
                last_at: now,
                count: 1,
            }),
        }
        self.total += 1;
    }

    fn fraction(&self) -> f64 {
        (self.total as f64 / f64::from(self.limit.max_requests)).min(1.0)
    }
}

#[derive(Debug, Clone)]
struct ProviderUsage {
    windows: Vec<SlidingWindow>,
    blocked_until: Option<Instant>,
    trend: VecDeque<(Instant, f64)>,
    total_sent: u64,
    total_denied: u64,
}

impl ProviderUsage {
    fn new(config: &ProviderConfig) -> Self {
        let mut limits = config.limits.clone();
        limits.sort_by_key(|l| l.window);
        Self {
            windows: limits.into_iter().map(SlidingWindow::new).collect(),
            blocked_until: None,
            trend: VecDeque::new(),
            total_sent: 0,
            total_denied: 0,
        }
    }

    fn evict(&mut self, now: Instant) {
        for window in &mut self.windows {
            window.evict(now);
        }
        if self.blocked_until.is_some_and(|until| now >= until) {
            self.blocked_until = None;
        }
    }

    fn permits(&self) -> bool {
        self.blocked_until.is_none() && self.windows.iter().all(SlidingWindow::has_room)
    }

    fn record(&mut self, now: Instant) {
        for window in &mut self.windows {
            window.record(now);
        }
        self.total_sent += 1;
    }

    fn max_fraction(&self) -> f64 {
        self.windows
            .iter()
            .map(SlidingWindow::fraction)
            .fold(0.0, f64::max)
    }
}

/// Usage of one window at a point in time.
#[derive(Debug, Clone, Serialize)]
pub struct WindowUsage {
    pub window: RateWindow,
    pub used: u64,
    pub max_requests: u32,
    pub fraction: f64,
}

/// Point-in-time view of a provider's rate state.
#[derive(Debug, Clone, Serialize)]
pub struct UsageSnapshot {
    pub provider: String,
    pub windows: Vec<WindowUsage>,
    /// Largest fraction across windows (the binding constraint).
    pub max_fraction: f64,
    /// Remaining provider-requested back-off, if any.
    pub blocked_for_ms: Option<u64>,
    pub spike_predicted: bool,
    pub total_sent: u64,
    pub total_denied: u64,
}

#[derive(Debug, Clone)]
struct Tuning {
    spike: SpikeConfig,
    max_backoff: Duration,
}

/// Sliding-window rate governor for every configured provider.
///
/// All per-provider mutation happens under the provider's map entry lock,
/// so concurrent `try_acquire` calls can never jointly overshoot a ceiling.
pub struct RateLimiter {
    clock: Arc<dyn Clock>,
    tuning: RwLock<Tuning>,
    providers: DashMap<String, ProviderUsage>,
}

impl RateLimiter {
    pub fn new(
        providers: &[ProviderConfig],
        spike: SpikeConfig,
        max_backoff: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let limiter = Self {
            clock,
            tuning: RwLock::new(Tuning { spike, max_backoff }),
            providers: DashMap::new(),
        };
        limiter.configure(providers);
        limiter
    }

    /// Replace the spike detector settings and the back-off cap. Existing
    /// blocks keep their deadline; trends longer than the new sample count
    /// are trimmed on the next sampling pass.
    pub fn set_tuning(&self, spike: SpikeConfig, max_backoff: Duration) {
        *self.tuning.write().unwrap_or_else(|e| e.into_inner()) = Tuning { spike, max_backoff };
    }

    pub fn spike_config(&self) -> SpikeConfig {
        self.tuning().spike
    }

    pub fn max_backoff(&self) -> Duration {
        self.tuning().max_backoff
    }

    fn tuning(&self) -> Tuning {
        self.tuning
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Replace the provider set. Usage already recorded for a provider and
    /// window that survive the change is kept; everything else is dropped.
    pub fn configure(&self, providers: &[ProviderConfig]) {
        self.providers
            .retain(|name, _| providers.iter().any(|p| &p.name == name));

        for config in providers {
            let mut fresh = ProviderUsage::new(config);
            if let Some(previous) = self.providers.get(&config.name) {
                for window in &mut fresh.windows {
                    if let Some(old) = previous
                        .windows
                        .iter()
                        .find(|w| w.limit.window == window.limit.window)
                    {
                        window.samples = old.samples.clone();
                        window.total = old.total;
                    }
                }
                fresh.blocked_until = previous.blocked_until;
                fresh.trend = previous.trend.clone();
                fresh.total_sent = previous.total_sent;
                fresh.total_denied = previous.total_denied;
            }
            self.providers.insert(config.name.clone(), fresh);
        }
    }

    /// Whether a request may be sent to `provider` right now without breaking
    /// any of its ceilings. Unknown providers are unthrottled.
    pub fn permit(&self, provider: &str) -> bool {
        let now = self.clock.now();
        match self.providers.get_mut(provider) {
            Some(mut usage) => {
                usage.evict(now);
                usage.permits()
            }
            None => true,
        }
    }

    /// Count one sent request against every window of `provider`.
    pub fn record(&self, provider: &str) {
        let now = self.clock.now();
        if let Some(mut usage) = self.providers.get_mut(provider) {
            usage.evict(now);
            usage.record(now);
        }
    }

    /// `permit` followed by `record`, atomically. Returns false, and records
    /// nothing, when any ceiling would be exceeded.
    pub fn try_acquire(&self, provider: &str) -> bool {
        self.acquire(provider, true)
    }

    /// Like `try_acquire`, but refuses providers this limiter does not
    /// govern. Callers holding a provider list that may predate the last
    /// `configure` use this so a dropped provider is never sent unthrottled.
    pub fn try_acquire_governed(&self, provider: &str) -> bool {
        self.acquire(provider, false)
    }

    fn acquire(&self, provider: &str, permit_unknown: bool) -> bool {
        let now = self.clock.now();
        let Some(mut usage) = self.providers.get_mut(provider) else {
            if !permit_unknown {
                tracing::debug!(provider, "provider is no longer governed, denying");
            }
            return permit_unknown;
        };
        usage.evict(now);
        if usage.permits() {
            usage.record(now);
            true
        } else {
            usage.total_denied += 1;
            tracing::debug!(provider, "rate limit denied");
            false
        }
    }

    /// Refuse permits for `provider` until `deadline`, capped at the
    /// configured maximum back-off. An earlier deadline never shortens an
    /// existing block.
    pub fn block_until(&self, provider: &str, deadline: Instant) {
        let now = self.clock.now();
        let capped = deadline.min(now + self.max_backoff());
        if let Some(mut usage) = self.providers.get_mut(provider) {
            let until = usage.blocked_until.map_or(capped, |b| b.max(capped));
            usage.blocked_until = Some(until);
            tracing::info!(
                provider,
                backoff_ms = until.saturating_duration_since(now).as_millis() as u64,
                "provider requested back-off"
            );
        }
    }

    /// `block_until` relative to now.
    pub fn block_for(&self, provider: &str, duration: Duration) {
        self.block_until(provider, self.clock.now() + duration);
    }

    /// Usage of `window` as a fraction of its ceiling, in [0, 1].
    /// Zero for windows the provider has no ceiling for.
    pub fn usage_fraction(&self, provider: &str, window: RateWindow) -> f64 {
        let now = self.clock.now();
        self.providers
            .get_mut(provider)
            .and_then(|mut usage| {
                usage.evict(now);
                usage
                    .windows
                    .iter()
                    .find(|w| w.limit.window == window)
                    .map(SlidingWindow::fraction)
            })
            .unwrap_or(0.0)
    }

    /// Fraction of the tightest window. A provider under back-off reports 1.0.
    pub fn max_usage_fraction(&self, provider: &str) -> f64 {
        let now = self.clock.now();
        match self.providers.get_mut(provider) {
            Some(mut usage) => {
                usage.evict(now);
                if usage.blocked_until.is_some() {
                    1.0
                } else {
                    usage.max_fraction()
                }
            }
            None => 0.0,
        }
    }

    /// Append the current max-window fraction of every provider to its trend
    /// buffer. Driven once per second by the background sampler.
    pub fn sample_all(&self) {
        let now = self.clock.now();
        let capacity = self.spike_config().samples;
        for mut entry in self.providers.iter_mut() {
            let usage = entry.value_mut();
            usage.evict(now);
            let fraction = usage.max_fraction();
            usage.trend.push_back((now, fraction));
            while usage.trend.len() > capacity {
                usage.trend.pop_front();
            }
        }
    }

    /// Whether the recent usage trend projects a ceiling hit within the
    /// configured horizon.
    ///
    /// Requires a strictly increasing tail of at least `min_rising` samples.
    /// A least-squares line through that tail is projected `horizon_secs`
    /// past the newest sample.
    pub fn is_spike_predicted(&self, provider: &str) -> bool {
        let spike = self.spike_config();
        self.providers
            .get(provider)
            .is_some_and(|usage| predict_spike(&usage.trend, &spike))
    }

    pub fn snapshot(&self, provider: &str) -> Option<UsageSnapshot> {
        let spike = self.spike_config();
        let now = self.clock.now();
        let mut usage = self.providers.get_mut(provider)?;
        usage.evict(now);
        let spike_predicted = predict_spike(&usage.trend, &spike);
        Some(UsageSnapshot {
            provider: provider.to_string(),
            windows: usage
                .windows
                .iter()
                .map(|w| WindowUsage {
                    window: w.limit.window,
                    used: w.total,
                    max_requests: w.limit.max_requests,
                    fraction: w.fraction(),
                })
                .collect(),
            max_fraction: usage.max_fraction(),
            blocked_for_ms: usage
                .blocked_until
                .map(|until| until.saturating_duration_since(now).as_millis() as u64),
            spike_predicted,
            total_sent: usage.total_sent,
            total_denied: usage.total_denied,
        })
    }

    /// Per-provider, per-window usage fractions.
    pub fn analytics(&self) -> RateLimitAnalytics {
        let mut out = RateLimitAnalytics::new();
        for name in self.provider_names() {
            if let Some(snapshot) = self.snapshot(&name) {
                out.insert(
                    name,
                    snapshot
                        .windows
                        .iter()
                        .map(|w| (w.window, w.fraction))
                        .collect(),
                );
            }
        }
        out
    }

    /// Names of all governed providers, sorted.
    pub fn provider_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Number of samples currently buffered for `provider`'s `window`.
    pub fn buffered_samples(&self, provider: &str, window: RateWindow) -> usize {
        self.providers
            .get(provider)
            .and_then(|usage| {
                usage
                    .windows
                    .iter()
                    .find(|w| w.limit.window == window)
                    .map(|w| w.samples.len())
            })
            .unwrap_or(0)
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("providers", &self.provider_names())
            .field("max_backoff", &self.max_backoff())
            .finish()
    }
}

fn predict_spike(trend: &VecDeque<(Instant, f64)>, config: &SpikeConfig) -> bool {
    // Length of the strictly increasing tail.
    let mut rising = 1;
    for i in (1..trend.len()).rev() {
        if trend[i].1 > trend[i - 1].1 {
            rising += 1;
        } else {
            break;
        }
    }
    if trend.len() < config.min_rising || rising < config.min_rising {
        return false;
    }

    let tail: Vec<(f64, f64)> = {
        let start = trend.len() - rising;
        let t0 = trend[start].0;
        trend
            .iter()
            .skip(start)
            .map(|(at, fraction)| (at.saturating_duration_since(t0).as_secs_f64(), *fraction))
            .collect()
    };

    let n = tail.len() as f64;
    let mean_t = tail.iter().map(|(t, _)| t).sum::<f64>() / n;
    let mean_f = tail.iter().map(|(_, f)| f).sum::<f64>() / n;
    let (mut num, mut den) = (0.0, 0.0);
    for (t, f) in &tail {
        num += (t - mean_t) * (f - mean_f);
        den += (t - mean_t) * (t - mean_t);
    }
    if den <= f64::EPSILON {
        return false;
    }
    let slope = num / den;
    let (last_t, last_f) = tail[tail.len() - 1];
    let fitted_last = mean_f + slope * (last_t - mean_t);
    let projected = fitted_last.max(last_f) + slope * config.horizon_secs;
    slope > 0.0 && projected >= 1.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn limiter_with(
        providers: Vec<ProviderConfig>,
    ) -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let limiter = RateLimiter::new(
            &providers,
            SpikeConfig::default(),
            Duration::from_secs(30),
            clock.clone(),
        );
        (limiter, clock)
    }

    fn per_second(name: &str, max: u32) -> ProviderConfig {
        ProviderConfig::new(name, vec![WindowLimit::new(RateWindow::Second, max)])
    }

    #[test]
    fn permit_denies_at_ceiling() {
        let (limiter, _clock) = limiter_with(vec![per_second("a", 3)]);
        for _ in 0..3 {
            assert!(limiter.permit("a"));
            limiter.record("a");
        }
        assert!(!limiter.permit("a"));
        assert_eq!(limiter.usage_fraction("a", RateWindow::Second), 1.0);
    }

    #[test]
    fn tightest_window_binds() {
        let config = ProviderConfig::new(
            "a",
            vec![
                WindowLimit::new(RateWindow::Second, 10),
                WindowLimit::new(RateWindow::Minute, 4),
            ],
        );
        let (limiter, clock) = limiter_with(vec![config]);
        for _ in 0..4 {
            assert!(limiter.try_acquire("a"));
            clock.advance(Duration::from_millis(300));
        }
        // Second window has room, minute window does not.
        assert!(limiter.usage_fraction("a", RateWindow::Second) < 1.0);
        assert!(!limiter.permit("a"));
        assert_eq!(limiter.max_usage_fraction("a"), 1.0);
    }

    #[test]
    fn samples_expire_after_window() {
        let (limiter, clock) = limiter_with(vec![per_second("a", 2)]);
        assert!(limiter.try_acquire("a"));
        assert!(limiter.try_acquire("a"));
        assert!(!limiter.try_acquire("a"));

        clock.advance(Duration::from_millis(999));
        assert!(!limiter.permit("a"));

        clock.advance(Duration::from_millis(1));
        assert!(limiter.permit("a"));
        assert_eq!(limiter.usage_fraction("a", RateWindow::Second), 0.0);
        assert_eq!(limiter.buffered_samples("a", RateWindow::Second), 0);
    }

    #[test]
    fn eviction_keeps_newer_samples() {
        let (limiter, clock) = limiter_with(vec![per_second("a", 10)]);
        limiter.record("a");
        clock.advance(Duration::from_millis(600));
        limiter.record("a");
        limiter.record("a");
        clock.advance(Duration::from_millis(500));

        // The first sample is 1.1s old, the other two 0.5s.
        assert!((limiter.usage_fraction("a", RateWindow::Second) - 0.2).abs() < 1e-9);
    }

    #[test]
    fn record_strictly_increases_counters() {
        let (limiter, _clock) = limiter_with(vec![per_second("a", 100)]);
        let mut previous = 0.0;
        for _ in 0..20 {
            limiter.record("a");
            let now = limiter.usage_fraction("a", RateWindow::Second);
            assert!(now > previous);
            previous = now;
        }
    }

    #[test]
    fn try_acquire_never_overshoots_ceiling() {
        let (limiter, _clock) = limiter_with(vec![per_second("a", 10)]);
        let granted = (0..25).filter(|_| limiter.try_acquire("a")).count();
        assert_eq!(granted, 10);
        assert!(limiter.usage_fraction("a", RateWindow::Second) <= 1.0);
        assert_eq!(limiter.snapshot("a").unwrap().total_denied, 15);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_acquire_has_no_lost_updates() {
        let clock = Arc::new(ManualClock::new());
        let limiter = Arc::new(RateLimiter::new(
            &[ProviderConfig::new(
                "a",
                vec![WindowLimit::new(RateWindow::Minute, 500)],
            )],
            SpikeConfig::default(),
            Duration::from_secs(30),
            clock,
        ));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                (0..100).filter(|_| limiter.try_acquire("a")).count()
            }));
        }
        let mut granted = 0;
        for handle in handles {
            granted += handle.await.unwrap();
        }
        assert_eq!(granted, 500);
        let snapshot = limiter.snapshot("a").unwrap();
        assert_eq!(snapshot.windows[0].used, 500);
        assert_eq!(snapshot.total_sent, 500);
    }

    #[test]
    fn unknown_and_unthrottled_providers_always_permit() {
        let (limiter, _clock) = limiter_with(vec![ProviderConfig::new("free", vec![])]);
        for _ in 0..1000 {
            assert!(limiter.try_acquire("free"));
        }
        assert!(limiter.permit("ghost"));
        assert_eq!(limiter.max_usage_fraction("free"), 0.0);
        assert_eq!(limiter.usage_fraction("ghost", RateWindow::Day), 0.0);
    }

    #[test]
    fn back_off_blocks_and_is_capped() {
        let (limiter, clock) = limiter_with(vec![per_second("a", 10)]);
        limiter.block_for("a", Duration::from_secs(120));
        assert!(!limiter.permit("a"));
        assert_eq!(limiter.max_usage_fraction("a"), 1.0);
        assert_eq!(limiter.snapshot("a").unwrap().blocked_for_ms, Some(30_000));

        clock.advance(Duration::from_secs(30));
        assert!(limiter.permit("a"));
        assert_eq!(limiter.snapshot("a").unwrap().blocked_for_ms, None);
    }

    #[test]
    fn coalescing_bounds_buffer_size() {
        let config = ProviderConfig::new("a", vec![WindowLimit::new(RateWindow::Hour, 100_000)]);
        let (limiter, clock) = limiter_with(vec![config]);
        for _ in 0..5_000 {
            limiter.record("a");
            clock.advance(Duration::from_millis(100));
        }
        // 500s of traffic at one-second granularity.
        assert!(limiter.buffered_samples("a", RateWindow::Hour) <= 501);
        assert_eq!(limiter.snapshot("a").unwrap().windows[0].used, 5_000);
    }

    #[test]
    fn day_window_frees_units_within_a_second_of_expiry() {
        let config = ProviderConfig::new("a", vec![WindowLimit::new(RateWindow::Day, 2)]);
        let (limiter, clock) = limiter_with(vec![config]);
        assert!(limiter.try_acquire("a"));
        clock.advance(Duration::from_secs(600));
        assert!(limiter.try_acquire("a"));
        assert!(!limiter.permit("a"));
        assert_eq!(limiter.buffered_samples("a", RateWindow::Day), 2);

        // One second past the first unit's expiry it no longer counts,
        // while the unit sent ten minutes later still does.
        clock.advance(RateWindow::Day.duration() - Duration::from_secs(600));
        clock.advance(Duration::from_secs(1));
        assert!(limiter.permit("a"));
        assert!((limiter.usage_fraction("a", RateWindow::Day) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn governed_acquire_refuses_dropped_providers() {
        let (limiter, _clock) = limiter_with(vec![per_second("a", 10), per_second("b", 10)]);
        limiter.configure(&[per_second("a", 10)]);

        assert!(!limiter.try_acquire_governed("b"));
        assert!(limiter.try_acquire("b"));
        assert!(limiter.try_acquire_governed("a"));
        assert!((limiter.usage_fraction("a", RateWindow::Second) - 0.1).abs() < 1e-9);
    }

    #[test]
    fn tuning_changes_cap_and_spike_settings() {
        let (limiter, _clock) = limiter_with(vec![per_second("a", 10)]);
        limiter.set_tuning(
            SpikeConfig {
                samples: 4,
                ..SpikeConfig::default()
            },
            Duration::from_secs(2),
        );
        assert_eq!(limiter.spike_config().samples, 4);

        limiter.block_for("a", Duration::from_secs(60));
        assert_eq!(limiter.snapshot("a").unwrap().blocked_for_ms, Some(2_000));
    }

    #[test]
    fn rising_trend_predicts_spike() {
        let (limiter, clock) = limiter_with(vec![per_second("a", 10)]);
        // Usage climbs 0.2 -> 0.5 -> 0.8 at one-second sampling.
        for burst in [2, 5, 8] {
            clock.advance(Duration::from_millis(1000));
            for _ in 0..burst {
                limiter.record("a");
            }
            limiter.sample_all();
        }
        assert!(limiter.is_spike_predicted("a"));
    }

    #[test]
    fn flat_or_slow_trend_predicts_nothing() {
        let (limiter, clock) = limiter_with(vec![per_second("a", 100)]);
        for burst in [5, 5, 5, 6, 7] {
            clock.advance(Duration::from_millis(1000));
            for _ in 0..burst {
                limiter.record("a");
            }
            limiter.sample_all();
        }
        assert!(!limiter.is_spike_predicted("a"));
    }

    #[test]
    fn too_few_samples_predict_nothing() {
        let (limiter, clock) = limiter_with(vec![per_second("a", 10)]);
        for burst in [5, 9] {
            clock.advance(Duration::from_millis(1000));
            for _ in 0..burst {
                limiter.record("a");
            }
            limiter.sample_all();
        }
        assert!(!limiter.is_spike_predicted("a"));
    }

    #[test]
    fn reads_do_not_feed_the_trend() {
        let (limiter, _clock) = limiter_with(vec![per_second("a", 10)]);
        for _ in 0..9 {
            limiter.record("a");
        }
        for _ in 0..10 {
            let _ = limiter.usage_fraction("a", RateWindow::Second);
            let _ = limiter.is_spike_predicted("a");
        }
        assert!(!limiter.is_spike_predicted("a"));
    }

    #[test]
    fn configure_keeps_usage_of_surviving_windows() {
        let (limiter, _clock) = limiter_with(vec![per_second("a", 10), per_second("b", 10)]);
        for _ in 0..5 {
            limiter.record("a");
        }
        limiter.configure(&[
            ProviderConfig::new(
                "a",
                vec![
                    WindowLimit::new(RateWindow::Second, 20),
                    WindowLimit::new(RateWindow::Minute, 100),
                ],
            ),
            per_second("c", 5),
        ]);

        assert_eq!(limiter.provider_names(), vec!["a", "c"]);
        assert!((limiter.usage_fraction("a", RateWindow::Second) - 0.25).abs() < 1e-9);
        assert_eq!(limiter.usage_fraction("a", RateWindow::Minute), 0.0);
    }

    #[test]
    fn analytics_reports_exact_fraction() {
        let (limiter, _clock) = limiter_with(vec![per_second("a", 10)]);
        for _ in 0..7 {
            assert!(limiter.try_acquire("a"));
        }
        let analytics = limiter.analytics();
        assert!((analytics["a"][&RateWindow::Second] - 0.7).abs() < 1e-9);
    }
}
