//! In-memory binary lookup
//!
//! Stands in for the persistence layer in embedded use, the CLI, and tests.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::cache::BinaryLookup;
use crate::types::{EndpointId, RuntimeError, StoredBinary};

#[derive(Debug, Default)]
pub struct InMemoryBinaryStore {
    binaries: DashMap<EndpointId, StoredBinary>,
    lookups: AtomicUsize,
}

impl InMemoryBinaryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a binary, returning the one it replaces
    pub fn insert(&self, endpoint_id: EndpointId, stored: StoredBinary) -> Option<StoredBinary> {
        self.binaries.insert(endpoint_id, stored)
    }

    pub fn remove(&self, endpoint_id: EndpointId) -> Option<StoredBinary> {
        self.binaries.remove(&endpoint_id).map(|(_, stored)| stored)
    }

    pub fn len(&self) -> usize {
        self.binaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.binaries.is_empty()
    }

    /// Number of lookups served so far
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BinaryLookup for InMemoryBinaryStore {
    async fn lookup(&self, endpoint_id: EndpointId) -> Result<Option<StoredBinary>, RuntimeError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.binaries.get(&endpoint_id).map(|entry| entry.value().clone()))
    }
}
