//! In-memory vector backend

use super::{cosine_distance, rank_by_distance, MetadataFilter, VectorBackend, VectorEntry};
use crate::error::RagdResult;
use crate::id::ChunkId;
use std::collections::HashMap;
use std::sync::RwLock;

/// Vector entries held in a map, searched by brute force.
///
/// Thread-safe via RwLock. Used for tests and ephemeral catalogs; the
/// persistent path is `SqliteVectorBackend`.
#[derive(Default)]
pub struct InMemoryVectorBackend {
    entries: RwLock<HashMap<String, VectorEntry>>,
}

impl InMemoryVectorBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VectorBackend for InMemoryVectorBackend {
    fn upsert(&self, entry: VectorEntry) -> RagdResult<()> {
        self.entries
            .write()
            .unwrap()
            .insert(entry.chunk_id.to_string(), entry);
        Ok(())
    }

    fn get(&self, chunk_id: &ChunkId) -> RagdResult<Option<VectorEntry>> {
        Ok(self.entries.read().unwrap().get(&chunk_id.to_string()).cloned())
    }

    fn remove(&self, chunk_id: &ChunkId) -> RagdResult<bool> {
        Ok(self
            .entries
            .write()
            .unwrap()
            .remove(&chunk_id.to_string())
            .is_some())
    }

    fn query(&self, vector: &[f32], k: usize, filter: &MetadataFilter) -> RagdResult<Vec<(ChunkId, f32)>> {
        let entries = self.entries.read().unwrap();
        let scored = entries
            .values()
            .filter(|e| filter.matches(&e.metadata))
            .map(|e| (e.chunk_id.clone(), cosine_distance(vector, &e.vector)))
            .collect();
        Ok(rank_by_distance(scored, k))
    }

    fn len(&self) -> RagdResult<usize> {
        Ok(self.entries.read().unwrap().len())
    }
}
