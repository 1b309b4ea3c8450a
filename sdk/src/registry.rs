//! Global provider registry with bare-id resolution.
//!
//! Providers are registered once at program start; there is no runtime
//! package fetching. A fully qualified `provider/modelId` resolves directly.
//! A bare model id resolves through the configurable precedence list, then
//! registration order, and the chosen provider is logged so the decision is
//! auditable.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock;

use strand_protocol::ModelRef;
use strand_protocol::ModelSpec;
use tracing::debug;
use tracing::info;

use crate::error::Result;
use crate::error::SdkError;
use crate::provider::Model;
use crate::provider::Provider;

/// Thread-safe registry of providers.
#[derive(Default)]
pub struct ProviderRegistry {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    providers: HashMap<String, Arc<dyn Provider>>,
    /// Registration order, for deterministic bare-id fallback.
    order: Vec<String>,
    /// Preferred providers for bare model ids, highest priority first.
    precedence: Vec<String>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with a bare-id precedence list.
    pub fn with_precedence(precedence: Vec<String>) -> Self {
        let registry = Self::new();
        registry.set_precedence(precedence);
        registry
    }

    /// Register a provider. Replaces an existing provider of the same name.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[allow(clippy::expect_used)]
    pub fn register(&self, provider: Arc<dyn Provider>) {
        let name = provider.name().to_string();
        debug!(provider = %name, "Registering provider");
        let mut inner = self
            .inner
            .write()
            .expect("provider registry lock should not be poisoned");
        if !inner.providers.contains_key(&name) {
            inner.order.push(name.clone());
        }
        inner.providers.insert(name, provider);
    }

    /// Get a provider by name.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[allow(clippy::expect_used)]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        let inner = self
            .inner
            .read()
            .expect("provider registry lock should not be poisoned");
        inner.providers.get(name).cloned()
    }

    /// List registered provider names in registration order.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[allow(clippy::expect_used)]
    pub fn list(&self) -> Vec<String> {
        let inner = self
            .inner
            .read()
            .expect("provider registry lock should not be poisoned");
        inner.order.clone()
    }

    /// Replace the bare-id precedence list.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[allow(clippy::expect_used)]
    pub fn set_precedence(&self, precedence: Vec<String>) {
        let mut inner = self
            .inner
            .write()
            .expect("provider registry lock should not be poisoned");
        inner.precedence = precedence;
    }

    /// Resolve a model reference to a concrete model handle.
    ///
    /// Qualified references look up their provider directly. Bare references
    /// walk the precedence list first, then registration order, and log the
    /// provider that was chosen.
    pub fn resolve(&self, model: &ModelRef) -> Result<(Arc<dyn Model>, ModelSpec)> {
        match model {
            ModelRef::Full(spec) => {
                let provider = self
                    .get(&spec.provider)
                    .ok_or_else(|| SdkError::ProviderNotFound(spec.provider.clone()))?;
                let handle = provider.model(&spec.model)?;
                Ok((handle, spec.clone()))
            }
            ModelRef::Bare(model_id) => {
                let provider = self
                    .pick_for_bare_id()
                    .ok_or_else(|| SdkError::ProviderNotFound("<none registered>".to_string()))?;
                info!(
                    provider = %provider.name(),
                    model = %model_id,
                    "Resolved bare model id via provider precedence"
                );
                let spec = ModelSpec::new(provider.name(), model_id.clone());
                let handle = provider.model(model_id)?;
                Ok((handle, spec))
            }
        }
    }

    /// Resolve a raw model string (`provider/modelId` or bare).
    pub fn resolve_str(&self, model: &str) -> Result<(Arc<dyn Model>, ModelSpec)> {
        let parsed = ModelRef::parse(model)
            .map_err(|e| SdkError::InvalidRequest(format!("invalid model id: {e}")))?;
        self.resolve(&parsed)
    }

    #[allow(clippy::expect_used)]
    fn pick_for_bare_id(&self) -> Option<Arc<dyn Provider>> {
        let inner = self
            .inner
            .read()
            .expect("provider registry lock should not be poisoned");
        for name in &inner.precedence {
            if let Some(provider) = inner.providers.get(name) {
                return Some(provider.clone());
            }
        }
        inner
            .order
            .first()
            .and_then(|name| inner.providers.get(name).cloned())
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.list())
            .finish()
    }
}

#[cfg(test)]
#[path = "registry.test.rs"]
mod tests;
