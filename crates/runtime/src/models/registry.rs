//! Registry mapping binary formats to their adapters

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use super::adapter::FormatAdapter;
use super::booster::BoosterAdapter;
use super::pickle::PickleAdapter;
use crate::types::{BinaryFormat, RuntimeError};

/// Central lookup of format adapters
///
/// Adapters can be replaced at runtime, e.g. to plug in an alternative
/// engine for a format; executors built afterwards use the new adapter.
pub struct AdapterRegistry {
    adapters: RwLock<HashMap<BinaryFormat, Arc<dyn FormatAdapter>>>,
}

impl AdapterRegistry {
    /// Registry without any adapter
    pub fn empty() -> Self {
        Self {
            adapters: RwLock::new(HashMap::new()),
        }
    }

    /// Registry with every built-in adapter
    pub fn with_defaults() -> Self {
        let registry = Self::empty();
        registry.register(Arc::new(PickleAdapter::pickle()));
        registry.register(Arc::new(PickleAdapter::joblib()));
        registry.register(Arc::new(BoosterAdapter::new()));
        #[cfg(feature = "pmml")]
        registry.register(Arc::new(super::pmml::PmmlAdapter::new()));
        registry
    }

    /// Register an adapter for its format, returning the one it replaces
    pub fn register(&self, adapter: Arc<dyn FormatAdapter>) -> Option<Arc<dyn FormatAdapter>> {
        let format = adapter.format();
        tracing::debug!(format = %format, adapter = adapter.name(), "Registering format adapter");
        self.adapters.write().insert(format, adapter)
    }

    /// Adapter for `format`
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::UnsupportedFormat`] when nothing is registered.
    pub fn get(&self, format: BinaryFormat) -> Result<Arc<dyn FormatAdapter>, RuntimeError> {
        self.adapters.read().get(&format).cloned().ok_or_else(|| {
            RuntimeError::UnsupportedFormat(format!("no adapter registered for {}", format))
        })
    }

    pub fn supports(&self, format: BinaryFormat) -> bool {
        self.adapters.read().contains_key(&format)
    }

    /// Registered formats in declaration order
    pub fn formats(&self) -> Vec<BinaryFormat> {
        let adapters = self.adapters.read();
        BinaryFormat::ALL
            .into_iter()
            .filter(|f| adapters.contains_key(f))
            .collect()
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("formats", &self.formats())
            .finish()
    }
}
