//! Events published by the orchestrator on its broadcast bus.
//!
//! All variants are Clone + Send + Sync for use with tokio broadcast channels.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::health::HealthState;
use crate::operation::OperationKind;
use crate::record::ExecutionRecord;

/// Why a provider was pushed down the ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DemotionReason {
    /// Tightest window at or above the near-limit threshold.
    NearLimit,
    /// Usage trend projects the ceiling will be reached shortly.
    SpikePredicted,
    /// Health state is Degraded or Recovering.
    Degraded,
}

/// A provider demoted during one ranking pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Demotion {
    pub provider: String,
    pub reason: DemotionReason,
}

/// Events emitted by the orchestrator, health monitor and load balancer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrchestratorEvent {
    /// A request was sent to a provider and finished.
    Execution(ExecutionRecord),

    /// Candidates were ranked for an operation.
    Ranked {
        request_id: Uuid,
        operation: OperationKind,
        /// Ranked provider names, best first.
        order: Vec<String>,
        demotions: Vec<Demotion>,
    },

    /// A provider moved between health states.
    HealthChanged {
        provider: String,
        from: HealthState,
        to: HealthState,
        reason: String,
    },
}
