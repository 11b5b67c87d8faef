//! Bounded, time-expiring cache of invocation executors
//!
//! The endpoint maps sit behind a reader/writer lock. Lookups take the
//! shared lock; a miss escalates to the exclusive lock, re-checks, and
//! reserves a per-endpoint slot. Deserialization then runs inside that
//! slot's `OnceCell`, outside the map lock, so only callers of the same
//! endpoint wait on it and at most one load per endpoint is in flight.
//!
//! Slots still loading live in their own map and do not count toward
//! `max_entries`; a slot joins the bounded resident map only once its
//! executor exists, so capacity eviction never drops an in-flight load.

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OnceCell, RwLock};
use tokio::time::Instant;

use crate::config::CacheConfig;
use crate::executor::InvocationExecutor;
use crate::models::AdapterRegistry;
use crate::types::{ConfigError, EndpointId, RuntimeError, StoredBinary};

/// Source of stored binaries, owned by the persistence layer
#[async_trait]
pub trait BinaryLookup: Send + Sync {
    /// Stored binary for `endpoint_id`, or `None` when the endpoint is unknown
    async fn lookup(&self, endpoint_id: EndpointId) -> Result<Option<StoredBinary>, RuntimeError>;
}

/// Cache counters since construction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Resident executors
    pub entries: usize,
    /// Loads currently in flight
    pub loading: usize,
    pub hits: u64,
    pub misses: u64,
    pub loads: u64,
    /// Entries dropped to stay within `max_entries`
    pub evictions: u64,
    pub expirations: u64,
    /// Entries dropped by `clear` and `evict`
    pub flushed: u64,
}

struct CachedExecutor {
    executor: Arc<InvocationExecutor>,
    loaded_at: Instant,
}

type Slot = Arc<OnceCell<CachedExecutor>>;

enum LoadMiss {
    Absent,
    Failed(RuntimeError),
}

#[derive(Default)]
struct Entries {
    /// Loaded executors, oldest first
    resident: IndexMap<EndpointId, Slot>,
    /// Slots whose load has not finished
    loading: HashMap<EndpointId, Slot>,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    loads: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
    flushed: AtomicU64,
}

pub struct ModelCache {
    entries: RwLock<Entries>,
    registry: Arc<AdapterRegistry>,
    max_entries: usize,
    ttl: Duration,
    counters: Counters,
}

impl ModelCache {
    /// Fails when either bound is zero
    pub fn new(config: &CacheConfig, registry: Arc<AdapterRegistry>) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            entries: RwLock::new(Entries::default()),
            registry,
            max_entries: config.max_entries,
            ttl: config.ttl,
            counters: Counters::default(),
        })
    }

    pub fn registry(&self) -> &Arc<AdapterRegistry> {
        &self.registry
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn is_expired(&self, cached: &CachedExecutor) -> bool {
        cached.loaded_at.elapsed() >= self.ttl
    }

    /// Executor for `endpoint_id`, loading it on a miss
    ///
    /// Returns `Ok(None)` when `lookup` does not know the endpoint; nothing is
    /// cached in that case. Construction failures are returned and not
    /// cached, so the next call retries.
    pub async fn get(
        &self,
        endpoint_id: EndpointId,
        lookup: &dyn BinaryLookup,
    ) -> Result<Option<Arc<InvocationExecutor>>, RuntimeError> {
        {
            let entries = self.entries.read().await;
            if let Some(cached) = entries.resident.get(&endpoint_id).and_then(|slot| slot.get()) {
                if !self.is_expired(cached) {
                    self.counters.hits.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(endpoint_id = %endpoint_id, "Model cache hit");
                    return Ok(Some(cached.executor.clone()));
                }
            }
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(endpoint_id = %endpoint_id, "Model cache miss");
        let slot = self.reserve(endpoint_id).await;

        let loaded = slot
            .get_or_try_init(|| self.load(endpoint_id, lookup))
            .await
            .map(|cached| cached.executor.clone());

        match loaded {
            Ok(executor) => {
                self.admit(endpoint_id, &slot).await;
                Ok(Some(executor))
            }
            Err(LoadMiss::Absent) => {
                self.discard(endpoint_id, &slot).await;
                Ok(None)
            }
            Err(LoadMiss::Failed(error)) => {
                self.discard(endpoint_id, &slot).await;
                Err(error)
            }
        }
    }

    /// Slot for `endpoint_id` under the exclusive lock, re-checking first
    async fn reserve(&self, endpoint_id: EndpointId) -> Slot {
        let mut entries = self.entries.write().await;

        if let Some(slot) = entries.resident.get(&endpoint_id) {
            match slot.get() {
                Some(cached) if self.is_expired(cached) => {}
                _ => return slot.clone(),
            }
        }

        if entries.resident.shift_remove(&endpoint_id).is_some() {
            self.counters.expirations.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(endpoint_id = %endpoint_id, "Model cache entry expired");
        }

        // another caller is already loading this endpoint
        if let Some(slot) = entries.loading.get(&endpoint_id) {
            return slot.clone();
        }

        let slot: Slot = Arc::new(OnceCell::new());
        entries.loading.insert(endpoint_id, slot.clone());
        slot
    }

    async fn load(
        &self,
        endpoint_id: EndpointId,
        lookup: &dyn BinaryLookup,
    ) -> Result<CachedExecutor, LoadMiss> {
        let stored = match lookup.lookup(endpoint_id).await {
            Ok(Some(stored)) => stored,
            Ok(None) => {
                tracing::debug!(endpoint_id = %endpoint_id, "No binary stored for endpoint");
                return Err(LoadMiss::Absent);
            }
            Err(error) => return Err(LoadMiss::Failed(error)),
        };

        self.counters.loads.fetch_add(1, Ordering::Relaxed);
        let executor = InvocationExecutor::new(&self.registry, &stored).map_err(|error| {
            tracing::error!(
                endpoint_id = %endpoint_id,
                format = %stored.format,
                error = %error,
                "Failed to construct invocation executor"
            );
            LoadMiss::Failed(error)
        })?;
        tracing::info!(endpoint_id = %endpoint_id, format = %stored.format, "Loaded model into cache");

        Ok(CachedExecutor {
            executor: Arc::new(executor),
            loaded_at: Instant::now(),
        })
    }

    /// Move a loaded slot into the resident map, evicting the oldest
    /// residents to make room
    ///
    /// Every waiter on the slot calls this; only the first finds it still
    /// in the loading map. A slot dropped by `clear` or `evict` while it
    /// was loading is not admitted.
    async fn admit(&self, endpoint_id: EndpointId, slot: &Slot) {
        let mut entries = self.entries.write().await;
        let pending = entries
            .loading
            .get(&endpoint_id)
            .map(|current| Arc::ptr_eq(current, slot))
            .unwrap_or(false);
        if !pending {
            return;
        }
        entries.loading.remove(&endpoint_id);

        while entries.resident.len() >= self.max_entries {
            let Some((evicted, _)) = entries.resident.shift_remove_index(0) else {
                break;
            };
            self.counters.evictions.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                endpoint_id = %evicted,
                max_entries = self.max_entries,
                "Evicting oldest model cache entry"
            );
        }

        entries.resident.insert(endpoint_id, slot.clone());
    }

    /// Drop a slot whose load did not produce an executor
    async fn discard(&self, endpoint_id: EndpointId, slot: &Slot) {
        let mut entries = self.entries.write().await;
        let unloaded = entries
            .loading
            .get(&endpoint_id)
            .map(|current| Arc::ptr_eq(current, slot) && !current.initialized())
            .unwrap_or(false);
        if unloaded {
            entries.loading.remove(&endpoint_id);
        }
    }

    /// Empty the cache immediately
    ///
    /// Loads in flight finish for their own callers but are not cached.
    pub async fn clear(&self) {
        let mut entries = self.entries.write().await;
        let flushed = entries.resident.len();
        entries.resident.clear();
        entries.loading.clear();
        self.counters.flushed.fetch_add(flushed as u64, Ordering::Relaxed);
        tracing::info!(entries = flushed, "Flushed model cache");
    }

    /// Remove one endpoint, returning whether it was resident
    pub async fn evict(&self, endpoint_id: EndpointId) -> bool {
        let mut entries = self.entries.write().await;
        entries.loading.remove(&endpoint_id);
        let removed = entries.resident.shift_remove(&endpoint_id).is_some();
        if removed {
            self.counters.flushed.fetch_add(1, Ordering::Relaxed);
            tracing::info!(endpoint_id = %endpoint_id, "Evicted model cache entry");
        }
        removed
    }

    /// Resident executors; loads in flight are not counted
    pub async fn len(&self) -> usize {
        self.entries.read().await.resident.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.resident.is_empty()
    }

    /// Whether a loaded, unexpired executor is resident for `endpoint_id`
    pub async fn contains(&self, endpoint_id: EndpointId) -> bool {
        self.entries
            .read()
            .await
            .resident
            .get(&endpoint_id)
            .and_then(|slot| slot.get())
            .map(|cached| !self.is_expired(cached))
            .unwrap_or(false)
    }

    /// Resident endpoint ids, oldest first
    pub async fn endpoints(&self) -> Vec<EndpointId> {
        self.entries.read().await.resident.keys().copied().collect()
    }

    pub async fn stats(&self) -> CacheStats {
        let (entries, loading) = {
            let entries = self.entries.read().await;
            (entries.resident.len(), entries.loading.len())
        };
        CacheStats {
            entries,
            loading,
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            loads: self.counters.loads.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            expirations: self.counters.expirations.load(Ordering::Relaxed),
            flushed: self.counters.flushed.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for ModelCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelCache")
            .field("max_entries", &self.max_entries)
            .field("ttl", &self.ttl)
            .field("registry", &self.registry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryBinaryStore;
    use crate::types::BinaryFormat;

    fn cache(max_entries: usize, ttl: Duration) -> ModelCache {
        ModelCache::new(
            &CacheConfig { max_entries, ttl },
            Arc::new(AdapterRegistry::with_defaults()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_unknown_endpoint_creates_no_entry() {
        let cache = cache(4, Duration::from_secs(60));
        let store = InMemoryBinaryStore::new();
        assert!(cache.get(EndpointId(7), &store).await.unwrap().is_none());
        assert!(cache.is_empty().await);
        assert_eq!(store.lookup_count(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_binary_is_not_cached() {
        let cache = cache(4, Duration::from_secs(60));
        let store = InMemoryBinaryStore::new();
        store.insert(EndpointId(1), StoredBinary::new(vec![0xffu8, 0x00], BinaryFormat::Pickle));

        for _ in 0..2 {
            assert!(matches!(
                cache.get(EndpointId(1), &store).await,
                Err(RuntimeError::CorruptBinary(_))
            ));
            assert!(cache.is_empty().await);
        }
        assert_eq!(store.lookup_count(), 2);
        assert_eq!(cache.stats().await.loads, 2);
    }

    #[tokio::test]
    async fn test_clear_and_evict() {
        let cache = cache(4, Duration::from_secs(60));
        let store = InMemoryBinaryStore::new();
        let model = crate::models::booster::tests::stump_model("reg:squarederror", "0");
        store.insert(EndpointId(1), StoredBinary::new(model.clone(), BinaryFormat::Booster));
        store.insert(EndpointId(2), StoredBinary::new(model, BinaryFormat::Booster));

        cache.get(EndpointId(1), &store).await.unwrap().unwrap();
        cache.get(EndpointId(2), &store).await.unwrap().unwrap();
        assert_eq!(cache.endpoints().await, vec![EndpointId(1), EndpointId(2)]);

        assert!(cache.evict(EndpointId(1)).await);
        assert!(!cache.evict(EndpointId(1)).await);
        assert!(cache.contains(EndpointId(2)).await);

        cache.clear().await;
        assert!(cache.is_empty().await);
        cache.get(EndpointId(2), &store).await.unwrap().unwrap();

        let stats = cache.stats().await;
        assert_eq!(stats.loads, 3);
        assert_eq!(stats.flushed, 2);
        assert_eq!(stats.evictions, 0);
    }

    #[test]
    fn test_zero_bounds_are_rejected() {
        let registry = Arc::new(AdapterRegistry::with_defaults());
        let zero_entries = CacheConfig {
            max_entries: 0,
            ttl: Duration::from_secs(60),
        };
        let zero_ttl = CacheConfig {
            max_entries: 4,
            ttl: Duration::ZERO,
        };

        assert!(matches!(
            ModelCache::new(&zero_entries, registry.clone()),
            Err(ConfigError::InvalidValue { key, .. }) if key == "cache.max_entries"
        ));
        assert!(matches!(
            ModelCache::new(&zero_ttl, registry),
            Err(ConfigError::InvalidValue { key, .. }) if key == "cache.ttl"
        ));
    }
}
