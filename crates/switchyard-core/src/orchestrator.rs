//! Fallback-chain execution across ranked providers.
//!
//! `execute` asks the load balancer for a ranking, then walks it strictly in
//! order: acquire a rate permit, invoke the provider under a bounded timeout,
//! classify the outcome, and stop at the first success. Every request that
//! was actually sent produces an `ExecutionRecord`; candidates skipped for
//! rate limits produce none. When nothing succeeds the caller gets a single
//! `AllProvidersExhausted` carrying every candidate's reason.
//!
//! Routing state (config, registry, routing table, balancer) lives in an
//! immutable snapshot swapped atomically by `reconfigure`. The rate limiter
//! and health monitor are long-lived and re-keyed in place, under the same
//! write lock as the swap, so usage and health survive a reconfiguration.
//! A call still running on an older snapshot is denied any provider the
//! limiter no longer governs.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::FutureExt;
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use switchyard_types::config::OrchestratorConfig;
use switchyard_types::error::{
    CandidateFailure, ConfigError, FailureReason, OrchestratorError, ProviderError,
};
use switchyard_types::event::OrchestratorEvent;
use switchyard_types::operation::{OperationKind, OperationRequest, RoutingHint};
use switchyard_types::record::{AttemptOutcome, ExecutionRecord};

use crate::balancer::{ExclusionReason, LoadBalancer, Ranking};
use crate::clock::{Clock, SystemClock};
use crate::event::EventBus;
use crate::health::HealthMonitor;
use crate::provider::{BoxProvider, ProviderRegistry};
use crate::rate_limiter::RateLimiter;
use crate::routing::RoutingTable;

/// How often the usage sampler feeds the spike detector.
const USAGE_SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// Result of a successful `execute`.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionOutcome {
    pub request_id: Uuid,
    /// Provider that produced the result.
    pub provider: String,
    pub operation: OperationKind,
    pub payload: serde_json::Value,
    pub latency_ms: u64,
    /// Candidates that were skipped or failed before the winner.
    pub attempts: Vec<CandidateFailure>,
}

/// Synchronous, in-process receiver of execution records.
pub trait ExecutionSink: Send + Sync {
    fn record(&self, record: &ExecutionRecord);
}

struct RoutingSnapshot {
    config: OrchestratorConfig,
    registry: ProviderRegistry,
    balancer: LoadBalancer,
}

impl RoutingSnapshot {
    fn timeout_for(&self, operation: &OperationKind, provider: &str) -> Duration {
        let ms = self
            .config
            .operation_timeouts
            .get(operation)
            .copied()
            .or_else(|| self.config.provider(provider).and_then(|p| p.timeout_ms))
            .unwrap_or(self.config.default_timeout_ms);
        Duration::from_millis(ms)
    }
}

/// Handle to the health probers and usage sampler.
pub struct BackgroundTasks {
    cancel: CancellationToken,
    tasks: JoinSet<()>,
}

impl BackgroundTasks {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Cancel every task and wait for them to finish.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        while let Some(result) = self.tasks.join_next().await {
            if let Err(e) = result {
                tracing::warn!(error = %e, "background task ended abnormally");
            }
        }
    }
}

/// Composition root: ranks, guards and executes operations.
pub struct Orchestrator {
    snapshot: RwLock<Arc<RoutingSnapshot>>,
    limiter: Arc<RateLimiter>,
    health: Arc<HealthMonitor>,
    events: EventBus,
    sinks: Vec<Arc<dyn ExecutionSink>>,
}

impl Orchestrator {
    /// Build an orchestrator on the system clock.
    pub fn new(config: OrchestratorConfig, registry: ProviderRegistry) -> Result<Self, ConfigError> {
        Self::with_clock(config, registry, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: OrchestratorConfig,
        registry: ProviderRegistry,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let events = EventBus::new(config.event_capacity);
        let limiter = Arc::new(RateLimiter::new(
            &config.providers,
            config.spike.clone(),
            Duration::from_millis(config.max_backoff_ms),
            clock.clone(),
        ));
        let health = Arc::new(HealthMonitor::new(
            config.providers.iter().map(|p| p.name.clone()),
            config.health.clone(),
            clock,
            events.clone(),
        ));
        let snapshot = build_snapshot(config, registry, &limiter, &health);
        Ok(Self {
            snapshot: RwLock::new(Arc::new(snapshot)),
            limiter,
            health,
            events,
            sinks: Vec::new(),
        })
    }

    /// Also deliver every execution record to `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn ExecutionSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn health(&self) -> &Arc<HealthMonitor> {
        &self.health
    }

    pub async fn config(&self) -> OrchestratorConfig {
        self.snapshot.read().await.config.clone()
    }

    pub async fn registry(&self) -> ProviderRegistry {
        self.snapshot.read().await.registry.clone()
    }

    /// Rank candidates for `operation` without executing anything.
    pub async fn rank(
        &self,
        operation: &OperationKind,
        hint: Option<&RoutingHint>,
    ) -> Result<Ranking, OrchestratorError> {
        let snapshot = self.current().await;
        snapshot.balancer.rank(operation, hint)
    }

    /// Replace configuration and providers atomically, including health
    /// thresholds, spike settings and the back-off cap. In-flight calls
    /// finish on the previous snapshot. Background tasks must be restarted
    /// by the caller to pick up new providers or probe cadence.
    pub async fn reconfigure(
        &self,
        config: OrchestratorConfig,
        registry: ProviderRegistry,
    ) -> Result<(), ConfigError> {
        config.validate()?;
        let mut current = self.snapshot.write().await;

        self.limiter.configure(&config.providers);
        self.limiter.set_tuning(
            config.spike.clone(),
            Duration::from_millis(config.max_backoff_ms),
        );
        let names: Vec<&str> = config.providers.iter().map(|p| p.name.as_str()).collect();
        self.health.sync_providers(&names);
        self.health.set_config(config.health.clone());

        let providers = config.providers.len();
        let routes = config.routing.len();
        *current = Arc::new(build_snapshot(config, registry, &self.limiter, &self.health));
        tracing::info!(providers, routes, "orchestrator reconfigured");
        Ok(())
    }

    /// Spawn one health prober per registered provider and the once-per-second
    /// usage sampler used for spike prediction.
    pub async fn start_background(&self) -> BackgroundTasks {
        let snapshot = self.current().await;
        let cancel = CancellationToken::new();
        let mut tasks = JoinSet::new();

        self.health
            .spawn_probers(&snapshot.registry, &cancel, &mut tasks);

        let limiter = Arc::clone(&self.limiter);
        let token = cancel.clone();
        tasks.spawn(async move {
            let mut ticker = tokio::time::interval(USAGE_SAMPLE_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => limiter.sample_all(),
                }
            }
        });

        tracing::info!(tasks = tasks.len(), "background tasks started");
        BackgroundTasks { cancel, tasks }
    }

    /// Execute `request` through its fallback chain.
    pub async fn execute(
        &self,
        request: &OperationRequest,
    ) -> Result<ExecutionOutcome, OrchestratorError> {
        self.execute_with_cancel(request, &CancellationToken::new())
            .await
    }

    /// Execute `request`, aborting when `cancel` fires.
    ///
    /// Cancellation before a request is sent records nothing. Cancellation
    /// while a request is in flight keeps its usage increment, appends a
    /// `cancelled` record and drops the provider future. Dropping the
    /// returned future mid-request is treated the same way.
    pub async fn execute_with_cancel(
        &self,
        request: &OperationRequest,
        cancel: &CancellationToken,
    ) -> Result<ExecutionOutcome, OrchestratorError> {
        let snapshot = self.current().await;
        let request_id = Uuid::now_v7();
        let operation = &request.operation;

        let ranking = snapshot.balancer.rank(operation, request.hint.as_ref())?;
        self.events.publish(OrchestratorEvent::Ranked {
            request_id,
            operation: operation.clone(),
            order: ranking.providers().into_iter().map(String::from).collect(),
            demotions: ranking.demotions(),
        });

        let mut failures: Vec<CandidateFailure> = ranking
            .excluded
            .iter()
            .filter(|e| e.reason == ExclusionReason::Unavailable)
            .map(|e| CandidateFailure {
                provider: e.provider.clone(),
                reason: FailureReason::ProviderUnavailable,
            })
            .collect();
        let mut attempt = 0u32;

        for candidate in &ranking.candidates {
            if cancel.is_cancelled() {
                return Err(OrchestratorError::Cancelled);
            }
            let name = candidate.provider.as_str();
            let Some(provider) = snapshot.registry.get(name) else {
                continue;
            };

            if !self.limiter.try_acquire_governed(name) {
                tracing::debug!(provider = name, %operation, "skipping rate-limited provider");
                failures.push(CandidateFailure {
                    provider: name.to_string(),
                    reason: FailureReason::RateLimitDenied,
                });
                continue;
            }
            attempt += 1;

            let timeout = snapshot.timeout_for(operation, name);
            let in_flight = InFlight {
                orchestrator: self,
                request_id,
                provider: name,
                operation,
                attempt,
                started: tokio::time::Instant::now(),
                armed: true,
            };
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = invoke_guarded(provider, request, timeout) => Some(result),
            };

            // Dropping `in_flight` here records the cancellation.
            let Some(result) = result else {
                return Err(OrchestratorError::Cancelled);
            };
            let latency = in_flight.settle();

            match result {
                Ok(payload) => {
                    self.health.record_success(name, latency);
                    self.emit(self.record(
                        request_id,
                        name,
                        operation,
                        latency,
                        attempt,
                        AttemptOutcome::Success,
                        None,
                    ));
                    if !failures.is_empty() {
                        tracing::info!(
                            provider = name,
                            %operation,
                            skipped = failures.len(),
                            "served by fallback provider"
                        );
                    }
                    return Ok(ExecutionOutcome {
                        request_id,
                        provider: name.to_string(),
                        operation: operation.clone(),
                        payload,
                        latency_ms: latency.as_millis() as u64,
                        attempts: failures,
                    });
                }
                Err(err) => {
                    let reason = classify(&err, timeout);
                    tracing::warn!(
                        provider = name,
                        %operation,
                        error = %err,
                        "provider failed, trying next in chain"
                    );
                    if let ProviderError::RateLimited { retry_after_ms } = &err {
                        let backoff = retry_after_ms.unwrap_or(snapshot.config.max_backoff_ms);
                        self.limiter
                            .block_for(name, Duration::from_millis(backoff));
                    }
                    self.health.record_failure(name, &err.to_string());
                    self.emit(self.record(
                        request_id,
                        name,
                        operation,
                        latency,
                        attempt,
                        AttemptOutcome::Failure,
                        Some(&reason),
                    ));
                    failures.push(CandidateFailure {
                        provider: name.to_string(),
                        reason,
                    });
                }
            }
        }

        tracing::error!(
            %operation,
            candidates = failures.len(),
            "all providers exhausted"
        );
        Err(OrchestratorError::AllProvidersExhausted {
            operation: operation.clone(),
            failures,
        })
    }

    async fn current(&self) -> Arc<RoutingSnapshot> {
        Arc::clone(&*self.snapshot.read().await)
    }

    #[allow(clippy::too_many_arguments)]
    fn record(
        &self,
        request_id: Uuid,
        provider: &str,
        operation: &OperationKind,
        latency: Duration,
        attempt: u32,
        outcome: AttemptOutcome,
        reason: Option<&FailureReason>,
    ) -> ExecutionRecord {
        ExecutionRecord {
            id: Uuid::now_v7(),
            request_id,
            provider: provider.to_string(),
            operation: operation.clone(),
            timestamp: Utc::now(),
            latency_ms: latency.as_millis() as u64,
            outcome,
            error_kind: match outcome {
                AttemptOutcome::Cancelled => Some(switchyard_types::record::ErrorKind::Cancelled),
                _ => reason.map(FailureReason::kind),
            },
            error_message: reason.map(ToString::to_string),
            attempt,
        }
    }

    fn emit(&self, record: ExecutionRecord) {
        for sink in &self.sinks {
            sink.record(&record);
        }
        self.events.publish(OrchestratorEvent::Execution(record));
    }
}

/// A request that has been sent but whose outcome is not yet recorded.
///
/// Dropped while armed (explicit cancellation, or the whole `execute` future
/// being dropped), it appends a `cancelled` record for the attempt.
struct InFlight<'a> {
    orchestrator: &'a Orchestrator,
    request_id: Uuid,
    provider: &'a str,
    operation: &'a OperationKind,
    attempt: u32,
    started: tokio::time::Instant,
    armed: bool,
}

impl InFlight<'_> {
    /// The outcome is known and will be recorded by the caller.
    fn settle(mut self) -> Duration {
        self.armed = false;
        self.started.elapsed()
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        tracing::info!(
            provider = self.provider,
            operation = %self.operation,
            "execution cancelled in flight"
        );
        let record = self.orchestrator.record(
            self.request_id,
            self.provider,
            self.operation,
            self.started.elapsed(),
            self.attempt,
            AttemptOutcome::Cancelled,
            None,
        );
        self.orchestrator.emit(record);
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("limiter", &self.limiter)
            .field("health", &self.health)
            .field("events", &self.events)
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

fn build_snapshot(
    config: OrchestratorConfig,
    registry: ProviderRegistry,
    limiter: &Arc<RateLimiter>,
    health: &Arc<HealthMonitor>,
) -> RoutingSnapshot {
    for name in registry.names() {
        if config.provider(name).is_none() {
            tracing::warn!(provider = name, "registered provider has no configuration, ignoring");
        }
    }
    for provider in &config.providers {
        if !registry.contains(&provider.name) {
            tracing::warn!(provider = %provider.name, "configured provider has no registered capability");
        }
    }

    let balancer = LoadBalancer::new(
        RoutingTable::new(config.routing.clone()),
        &config.providers,
        config.scoring.clone(),
        Arc::clone(limiter),
        Arc::clone(health),
    )
    .with_registered(registry.names());

    RoutingSnapshot {
        config,
        registry,
        balancer,
    }
}

/// Invoke under a timeout, converting a panic inside the provider into an
/// ordinary provider error.
async fn invoke_guarded(
    provider: &BoxProvider,
    request: &OperationRequest,
    timeout: Duration,
) -> Result<serde_json::Value, ProviderError> {
    let call = tokio::time::timeout(
        timeout,
        provider.invoke(&request.operation, &request.params, timeout),
    );
    match AssertUnwindSafe(call).catch_unwind().await {
        Ok(Ok(result)) => result,
        Ok(Err(_elapsed)) => Err(ProviderError::Timeout),
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(ProviderError::Internal(format!("provider panicked: {message}")))
        }
    }
}

fn classify(err: &ProviderError, timeout: Duration) -> FailureReason {
    match err {
        ProviderError::Timeout => FailureReason::ProviderTimeout {
            timeout_ms: timeout.as_millis() as u64,
        },
        other => FailureReason::ProviderError {
            message: other.to_string(),
        },
    }
}
