//! Adapter registry -- an ordered, named collection of provider adapters.
//!
//! Declaration order matters: aggregation resolves title/recommendation
//! ties by the order providers were registered, so the registry preserves
//! insertion order rather than hashing.

use super::builtin_adapter;
use super::spec::ProviderAdapter;

/// Ordered collection of [`ProviderAdapter`]s keyed by provider id.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: Vec<Box<dyn ProviderAdapter>>,
}

impl AdapterRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from builtin provider names, preserving order.
    ///
    /// Fails on the first unknown provider name.
    pub fn with_providers(providers: &[String]) -> anyhow::Result<Self> {
        let mut registry = Self::new();
        for name in providers {
            let adapter = builtin_adapter(name).ok_or_else(|| {
                anyhow::anyhow!(
                    "unknown provider: {name} (expected one of {})",
                    super::BUILTIN_PROVIDERS.join(", ")
                )
            })?;
            registry.register(adapter);
        }
        Ok(registry)
    }

    /// Register an adapter under its provider id.
    ///
    /// Re-registering an id replaces the previous adapter in place,
    /// keeping its original position.
    pub fn register(&mut self, adapter: impl ProviderAdapter + 'static) {
        let id = adapter.provider_id().to_string();
        match self.adapters.iter().position(|a| a.provider_id() == id) {
            Some(index) => self.adapters[index] = Box::new(adapter),
            None => self.adapters.push(Box::new(adapter)),
        }
    }

    /// Look up an adapter by provider id.
    pub fn get(&self, provider_id: &str) -> Option<&dyn ProviderAdapter> {
        self.adapters
            .iter()
            .find(|a| a.provider_id() == provider_id)
            .map(|a| a.as_ref())
    }

    /// Provider ids in registration order.
    pub fn list(&self) -> Vec<&str> {
        self.adapters.iter().map(|a| a.provider_id()).collect()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("adapters", &self.list())
            .finish()
    }
}
