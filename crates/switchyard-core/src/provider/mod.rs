//! Provider capability abstractions.
//!
//! - `Provider`: RPITIT trait implemented by concrete backends
//! - `BoxProvider`: object-safe wrapper for dynamic dispatch
//! - `ProviderRegistry`: name-indexed set of boxed providers

pub mod box_provider;
pub mod registry;
#[allow(clippy::module_inception)]
pub mod provider;

pub use box_provider::BoxProvider;
pub use provider::{Params, Provider};
pub use registry::ProviderRegistry;
