//! Registry of analyst capabilities

use hedge_core::{AnalystCapability, AnalystKey, Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Immutable key → capability table, populated at startup
///
/// Registration order is preserved and is the order used when a run does not
/// select analysts explicitly.
#[derive(Clone, Default)]
pub struct CapabilityRegistry {
    order: Vec<AnalystKey>,
    capabilities: HashMap<AnalystKey, Arc<dyn AnalystCapability>>,
}

impl CapabilityRegistry {
    /// Create a new registry builder
    pub fn builder() -> CapabilityRegistryBuilder {
        CapabilityRegistryBuilder::default()
    }

    /// Get the capability registered under `key`
    pub fn lookup(&self, key: &AnalystKey) -> Result<Arc<dyn AnalystCapability>> {
        self.capabilities.get(key).cloned().ok_or_else(|| {
            Error::UnknownCapability(format!(
                "no analyst registered under '{key}'. Available analysts: {:?}",
                self.keys().map(AnalystKey::as_str).collect::<Vec<_>>()
            ))
        })
    }

    pub fn contains(&self, key: &AnalystKey) -> bool {
        self.capabilities.contains_key(key)
    }

    /// Registered keys in registration order
    pub fn keys(&self) -> impl Iterator<Item = &AnalystKey> {
        self.order.iter()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("keys", &self.order)
            .finish()
    }
}

/// Builder for [`CapabilityRegistry`]
#[derive(Default)]
pub struct CapabilityRegistryBuilder {
    registry: CapabilityRegistry,
}

impl CapabilityRegistryBuilder {
    /// Register a capability
    ///
    /// Registering a key twice replaces the earlier capability and keeps the
    /// original position.
    pub fn register(mut self, key: AnalystKey, capability: Arc<dyn AnalystCapability>) -> Self {
        if self.registry.capabilities.insert(key.clone(), capability).is_some() {
            warn!("Analyst '{}' registered twice, replacing", key);
        } else {
            self.registry.order.push(key);
        }
        self
    }

    /// Register a capability under a string key
    pub fn register_str(
        self,
        key: &str,
        capability: Arc<dyn AnalystCapability>,
    ) -> Result<Self> {
        let key = AnalystKey::new(key)?;
        Ok(self.register(key, capability))
    }

    pub fn build(self) -> CapabilityRegistry {
        self.registry
    }
}
