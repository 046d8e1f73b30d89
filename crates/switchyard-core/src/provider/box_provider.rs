//! BoxProvider -- object-safe dynamic dispatch wrapper for `Provider`.
//!
//! 1. `ProviderDyn` is an object-safe mirror of `Provider` with boxed futures
//! 2. Blanket-impl `ProviderDyn` for all `T: Provider`
//! 3. `BoxProvider` wraps `Box<dyn ProviderDyn>` and delegates

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use switchyard_types::error::ProviderError;
use switchyard_types::health::ProbeOutcome;
use switchyard_types::operation::OperationKind;

use super::provider::{Params, Provider};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Object-safe version of [`Provider`] with boxed futures.
pub trait ProviderDyn: Send + Sync {
    fn name(&self) -> &str;

    fn invoke_boxed<'a>(
        &'a self,
        operation: &'a OperationKind,
        params: &'a Params,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<serde_json::Value, ProviderError>>;

    fn probe_boxed(&self, timeout: Duration) -> BoxFuture<'_, ProbeOutcome>;
}

impl<T: Provider> ProviderDyn for T {
    fn name(&self) -> &str {
        Provider::name(self)
    }

    fn invoke_boxed<'a>(
        &'a self,
        operation: &'a OperationKind,
        params: &'a Params,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<serde_json::Value, ProviderError>> {
        Box::pin(self.invoke(operation, params, timeout))
    }

    fn probe_boxed(&self, timeout: Duration) -> BoxFuture<'_, ProbeOutcome> {
        Box::pin(self.probe(timeout))
    }
}

/// Type-erased provider for runtime selection.
///
/// Since `Provider` uses RPITIT it cannot be a trait object directly;
/// `BoxProvider` exposes the same methods over a `ProviderDyn` object.
pub struct BoxProvider {
    inner: Box<dyn ProviderDyn>,
}

impl BoxProvider {
    /// Wrap a concrete `Provider` in a type-erased box.
    pub fn new<T: Provider + 'static>(provider: T) -> Self {
        Self {
            inner: Box::new(provider),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub async fn invoke(
        &self,
        operation: &OperationKind,
        params: &Params,
        timeout: Duration,
    ) -> Result<serde_json::Value, ProviderError> {
        self.inner.invoke_boxed(operation, params, timeout).await
    }

    pub async fn probe(&self, timeout: Duration) -> ProbeOutcome {
        self.inner.probe_boxed(timeout).await
    }
}

impl std::fmt::Debug for BoxProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxProvider")
            .field("name", &self.name())
            .finish()
    }
}
