//! Provider trait definition.
//!
//! The capability every backend exposes to the orchestrator: invoke an
//! operation and answer a lightweight status probe. Credentials and wire
//! protocols stay behind this boundary.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use switchyard_types::error::ProviderError;
use switchyard_types::health::ProbeOutcome;
use switchyard_types::operation::OperationKind;

/// Named request parameters.
pub type Params = BTreeMap<String, serde_json::Value>;

/// Trait for external API backends (brokers, market-data vendors, ...).
///
/// Uses native async fn in traits (RPITIT, Rust 2024 edition). `timeout` is
/// advisory: the orchestrator enforces it independently, so implementations
/// may pass it on to their HTTP client or ignore it.
pub trait Provider: Send + Sync {
    /// Provider name, matching `ProviderConfig.name`.
    fn name(&self) -> &str;

    /// Execute one operation against the backend.
    fn invoke(
        &self,
        operation: &OperationKind,
        params: &Params,
        timeout: Duration,
    ) -> impl Future<Output = Result<serde_json::Value, ProviderError>> + Send;

    /// Cheap liveness check used by the health monitor.
    fn probe(&self, timeout: Duration) -> impl Future<Output = ProbeOutcome> + Send;
}
