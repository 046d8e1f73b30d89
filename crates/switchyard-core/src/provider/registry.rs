//! Provider registry for runtime lookup.

use std::collections::HashMap;
use std::sync::Arc;

use super::box_provider::BoxProvider;

/// Registry of provider capabilities, indexed by name.
///
/// Entries are shared (`Arc`) so background probers can hold a provider
/// while the orchestrator swaps in a new registry.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<BoxProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under its own name, replacing any previous entry.
    pub fn register(&mut self, provider: BoxProvider) {
        self.providers
            .insert(provider.name().to_string(), Arc::new(provider));
    }

    /// Builder-style `register`.
    pub fn with(mut self, provider: BoxProvider) -> Self {
        self.register(provider);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<BoxProvider>> {
        self.providers.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<BoxProvider>)> {
        self.providers.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}
