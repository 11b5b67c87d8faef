//! Model Runtime
//!
//! The model runtime is the serving core of the model platform: it turns
//! stored model binaries into invocable executors, keeps a bounded,
//! time-expiring cache of them, and maps parameter lists onto each model's
//! native input and back into a uniform prediction result.

pub mod cache;
pub mod config;
pub mod executor;
pub mod inspection;
pub mod models;
pub mod normalize;
pub mod prelude;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use cache::{BinaryLookup, CacheStats, ModelCache};
pub use config::{CacheConfig, ExecutorConfig, LogFormat, LoggingConfig, RuntimeConfig};
pub use executor::InvocationExecutor;
pub use inspection::{inspect_binary, pickle_protocol, BinarySignature};
pub use models::{AdapterRegistry, FormatAdapter, ModelHandle, ModelMethod, ModelSignature};
pub use store::InMemoryBinaryStore;
pub use types::*;

use std::sync::Arc;

/// Main model runtime
///
/// Constructed once at startup and shared; clones share the cache.
#[derive(Clone)]
pub struct ModelRuntime {
    cache: Arc<ModelCache>,
    lookup: Arc<dyn BinaryLookup>,
    config: Arc<RuntimeConfig>,
}

impl ModelRuntime {
    /// Create a runtime with every built-in format adapter
    pub fn new(config: RuntimeConfig, lookup: Arc<dyn BinaryLookup>) -> Result<Self, RuntimeError> {
        Self::with_registry(config, lookup, AdapterRegistry::with_defaults())
    }

    /// Create a runtime over a custom adapter registry
    pub fn with_registry(
        config: RuntimeConfig,
        lookup: Arc<dyn BinaryLookup>,
        registry: AdapterRegistry,
    ) -> Result<Self, RuntimeError> {
        config.validate()?;

        let registry = Arc::new(registry);
        tracing::info!(
            max_entries = config.cache.max_entries,
            ttl = ?config.cache.ttl,
            formats = ?registry.formats(),
            "Initialized model runtime"
        );

        Ok(Self {
            cache: Arc::new(ModelCache::new(&config.cache, registry)?),
            lookup,
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<ModelCache> {
        &self.cache
    }

    pub fn registry(&self) -> &Arc<AdapterRegistry> {
        self.cache.registry()
    }

    /// Executor for an endpoint, loading it on a cache miss
    pub async fn executor(
        &self,
        endpoint_id: EndpointId,
    ) -> Result<Option<Arc<InvocationExecutor>>, RuntimeError> {
        self.cache.get(endpoint_id, self.lookup.as_ref()).await
    }

    /// Run one prediction request against an endpoint
    ///
    /// Returns `Ok(None)` when the endpoint has no stored binary.
    pub async fn predict(
        &self,
        endpoint_id: EndpointId,
        request: PredictionRequest,
    ) -> Result<Option<Prediction>, RuntimeError> {
        let Some(executor) = self.executor(endpoint_id).await? else {
            return Ok(None);
        };

        let prediction = if self.config.executor.offload_predictions {
            tokio::task::spawn_blocking(move || executor.predict(&request))
                .await
                .map_err(|e| RuntimeError::Internal(format!("prediction task failed: {}", e)))??
        } else {
            executor.predict(&request)?
        };

        Ok(Some(prediction))
    }

    /// Flush every cached executor
    pub async fn clear(&self) {
        self.cache.clear().await;
    }

    /// Flush one endpoint, e.g. after its binary was replaced
    pub async fn evict(&self, endpoint_id: EndpointId) -> bool {
        self.cache.evict(endpoint_id).await
    }

    pub async fn stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    /// Probe an upload before it is stored
    pub fn inspect(&self, stored: &StoredBinary) -> Result<BinarySignature, RuntimeError> {
        inspect_binary(self.registry(), stored)
    }
}

impl std::fmt::Debug for ModelRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRuntime")
            .field("cache", &self.cache)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::booster::tests::stump_model;
    use serde_json::json;

    fn runtime(store: Arc<InMemoryBinaryStore>, offload: bool) -> ModelRuntime {
        let mut config = RuntimeConfig::default();
        config.executor.offload_predictions = offload;
        ModelRuntime::new(config, store).unwrap()
    }

    fn request() -> PredictionRequest {
        PredictionRequest::row(vec![Parameter::new("x", 1.0), Parameter::new("y", 0.0)])
    }

    #[tokio::test]
    async fn test_predict_unknown_endpoint() {
        let runtime = runtime(Arc::new(InMemoryBinaryStore::new()), false);
        assert!(runtime.predict(EndpointId(1), request()).await.unwrap().is_none());
        assert_eq!(runtime.stats().await.entries, 0);
    }

    #[tokio::test]
    async fn test_predict_offloaded_and_inline_agree() {
        let store = Arc::new(InMemoryBinaryStore::new());
        store.insert(
            EndpointId(1),
            StoredBinary::new(stump_model("reg:squarederror", "0"), BinaryFormat::Booster),
        );

        let inline = runtime(store.clone(), false);
        let offloaded = runtime(store, true);
        let a = inline.predict(EndpointId(1), request()).await.unwrap().unwrap();
        let b = offloaded.predict(EndpointId(1), request()).await.unwrap().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.predictions, json!(1.0));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = RuntimeConfig::default();
        config.cache.max_entries = 0;
        assert!(matches!(
            ModelRuntime::new(config, Arc::new(InMemoryBinaryStore::new())),
            Err(RuntimeError::Configuration(_))
        ));
    }
}
