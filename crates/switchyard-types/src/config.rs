//! Orchestrator configuration.
//!
//! `OrchestratorConfig` represents the `switchyard.toml` that declares the
//! providers, their ceilings, routing rules, and tuning knobs. Every section
//! has defaults; `validate()` enforces cross-field consistency.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::operation::OperationKind;
use crate::provider::ProviderConfig;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,

    /// Operation kind -> ordered fallback chain of provider names.
    #[serde(default)]
    pub routing: BTreeMap<OperationKind, Vec<String>>,

    /// Operation kind -> invocation timeout override in milliseconds.
    #[serde(default)]
    pub operation_timeouts: BTreeMap<OperationKind, u64>,

    /// Timeout used when neither the operation nor the provider sets one.
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,

    #[serde(default)]
    pub scoring: ScoringWeights,

    #[serde(default)]
    pub health: HealthConfig,

    #[serde(default)]
    pub spike: SpikeConfig,

    /// Broadcast channel capacity for orchestrator events.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Upper bound on a provider-requested back-off.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_event_capacity() -> usize {
    1024
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
            routing: BTreeMap::new(),
            operation_timeouts: BTreeMap::new(),
            default_timeout_ms: default_timeout_ms(),
            scoring: ScoringWeights::default(),
            health: HealthConfig::default(),
            spike: SpikeConfig::default(),
            event_capacity: default_event_capacity(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl OrchestratorConfig {
    /// Check cross-field consistency. Called before a config is put to use.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut names = HashSet::new();
        for provider in &self.providers {
            if provider.name.trim().is_empty() {
                return Err(ConfigError::InvalidSetting {
                    field: "providers.name".to_string(),
                    message: "must not be empty".to_string(),
                });
            }
            if !names.insert(provider.name.as_str()) {
                return Err(ConfigError::DuplicateProvider(provider.name.clone()));
            }
            if !provider.priority.is_finite() || !(0.0..=1.0).contains(&provider.priority) {
                return Err(ConfigError::InvalidPriority {
                    provider: provider.name.clone(),
                    priority: provider.priority,
                });
            }
            let mut windows = HashSet::new();
            for limit in &provider.limits {
                if limit.max_requests == 0 {
                    return Err(ConfigError::InvalidLimit {
                        provider: provider.name.clone(),
                        message: format!("{} ceiling must be positive", limit.window),
                    });
                }
                if !windows.insert(limit.window) {
                    return Err(ConfigError::InvalidLimit {
                        provider: provider.name.clone(),
                        message: format!("{} window declared twice", limit.window),
                    });
                }
            }
            if provider.timeout_ms == Some(0) {
                return Err(ConfigError::InvalidSetting {
                    field: format!("providers.{}.timeout_ms", provider.name),
                    message: "must be positive".to_string(),
                });
            }
        }

        for (operation, chain) in &self.routing {
            if chain.is_empty() {
                return Err(ConfigError::InvalidRoute {
                    operation: operation.to_string(),
                    message: "fallback chain is empty".to_string(),
                });
            }
            let mut seen = HashSet::new();
            for provider in chain {
                if !names.contains(provider.as_str()) {
                    return Err(ConfigError::UnknownProvider {
                        operation: operation.to_string(),
                        provider: provider.clone(),
                    });
                }
                if !seen.insert(provider.as_str()) {
                    return Err(ConfigError::InvalidRoute {
                        operation: operation.to_string(),
                        message: format!("provider '{provider}' listed twice"),
                    });
                }
            }
        }

        if self.default_timeout_ms == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "default_timeout_ms".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if let Some((op, _)) = self.operation_timeouts.iter().find(|(_, ms)| **ms == 0) {
            return Err(ConfigError::InvalidSetting {
                field: format!("operation_timeouts.{op}"),
                message: "must be positive".to_string(),
            });
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "event_capacity".to_string(),
                message: "must be positive".to_string(),
            });
        }

        self.scoring.validate()?;
        self.health.validate()?;
        self.spike.validate()
    }

    pub fn provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.name == name)
    }
}

/// Weights and penalties used by the load balancer.
///
/// Defaults favour rate headroom > success rate > latency > static priority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub rate_headroom: f64,
    pub latency: f64,
    pub success_rate: f64,
    pub priority: f64,
    /// Subtracted from headroom when a usage spike is predicted.
    pub spike_penalty: f64,
    /// Subtracted from the score of Degraded or Recovering providers.
    pub degraded_penalty: f64,
    /// Usage fraction at which a provider drops into the last-resort partition.
    pub near_limit_threshold: f64,
    /// Latency at which the normalised latency term saturates.
    pub latency_ceiling_ms: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            rate_headroom: 0.4,
            latency: 0.15,
            success_rate: 0.35,
            priority: 0.1,
            spike_penalty: 0.5,
            degraded_penalty: 0.3,
            near_limit_threshold: 0.8,
            latency_ceiling_ms: 2_000.0,
        }
    }
}

impl ScoringWeights {
    fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("scoring.rate_headroom", self.rate_headroom),
            ("scoring.latency", self.latency),
            ("scoring.success_rate", self.success_rate),
            ("scoring.priority", self.priority),
            ("scoring.spike_penalty", self.spike_penalty),
            ("scoring.degraded_penalty", self.degraded_penalty),
        ];
        for (field, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidSetting {
                    field: field.to_string(),
                    message: format!("{value} is not a non-negative number"),
                });
            }
        }
        if !(self.near_limit_threshold > 0.0 && self.near_limit_threshold <= 1.0) {
            return Err(ConfigError::InvalidSetting {
                field: "scoring.near_limit_threshold".to_string(),
                message: "must be in (0, 1]".to_string(),
            });
        }
        if !(self.latency_ceiling_ms.is_finite() && self.latency_ceiling_ms > 0.0) {
            return Err(ConfigError::InvalidSetting {
                field: "scoring.latency_ceiling_ms".to_string(),
                message: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}

/// Health state machine thresholds and probe cadence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub probe_interval_secs: u64,
    pub probe_timeout_ms: u64,
    /// Consecutive failed executions that move Available -> Degraded.
    pub degrade_after_failures: u32,
    /// Consecutive failures while Degraded that move it to Unavailable.
    pub unavailable_after_failures: u32,
    /// Consecutive successful probes that move Recovering -> Available.
    pub recovery_successes: u32,
    /// Failure-free time in Recovering after which it becomes Available.
    pub recovery_cooldown_secs: u64,
    /// EMA smoothing factor for latency, in (0, 1].
    pub latency_alpha: f64,
    /// Number of recent executions used for the success rate.
    pub success_window: usize,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            probe_interval_secs: 30,
            probe_timeout_ms: 2_000,
            degrade_after_failures: 3,
            unavailable_after_failures: 2,
            recovery_successes: 3,
            recovery_cooldown_secs: 60,
            latency_alpha: 0.3,
            success_window: 50,
        }
    }
}

impl HealthConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("health.probe_interval_secs", self.probe_interval_secs),
            ("health.probe_timeout_ms", self.probe_timeout_ms),
            ("health.degrade_after_failures", self.degrade_after_failures as u64),
            (
                "health.unavailable_after_failures",
                self.unavailable_after_failures as u64,
            ),
            ("health.recovery_successes", self.recovery_successes as u64),
            ("health.success_window", self.success_window as u64),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::InvalidSetting {
                    field: field.to_string(),
                    message: "must be positive".to_string(),
                });
            }
        }
        if !(self.latency_alpha > 0.0 && self.latency_alpha <= 1.0) {
            return Err(ConfigError::InvalidSetting {
                field: "health.latency_alpha".to_string(),
                message: "must be in (0, 1]".to_string(),
            });
        }
        Ok(())
    }
}

/// Predictive spike detector settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpikeConfig {
    /// Number of once-per-second usage samples kept per provider.
    pub samples: usize,
    /// Minimum length of the rising tail before a projection is made.
    pub min_rising: usize,
    /// How far ahead the trend is projected, in seconds.
    pub horizon_secs: f64,
}

impl Default for SpikeConfig {
    fn default() -> Self {
        Self {
            samples: 10,
            min_rising: 3,
            horizon_secs: 2.0,
        }
    }
}

impl SpikeConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.min_rising < 2 || self.min_rising > self.samples {
            return Err(ConfigError::InvalidSetting {
                field: "spike.min_rising".to_string(),
                message: format!("must be between 2 and samples ({})", self.samples),
            });
        }
        if !(self.horizon_secs.is_finite() && self.horizon_secs > 0.0) {
            return Err(ConfigError::InvalidSetting {
                field: "spike.horizon_secs".to_string(),
                message: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}
