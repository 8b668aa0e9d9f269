//! Vector backend with injectable outages

use ragd::index::{InMemoryVectorBackend, MetadataFilter, VectorBackend, VectorEntry};
use ragd::{ChunkId, RagdError, RagdResult};
use std::sync::atomic::{AtomicBool, AtomicIsize, Ordering};

/// Wraps the in-memory backend and fails on request with `IndexUnavailable`.
pub struct FlakyBackend {
    inner: InMemoryVectorBackend,
    fail_upserts: AtomicBool,
    /// Successful removes left before removes start failing; negative means never
    remove_budget: AtomicIsize,
}

impl Default for FlakyBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl FlakyBackend {
    pub fn new() -> Self {
        Self {
            inner: InMemoryVectorBackend::new(),
            fail_upserts: AtomicBool::new(false),
            remove_budget: AtomicIsize::new(-1),
        }
    }

    pub fn fail_upserts(&self, fail: bool) {
        self.fail_upserts.store(fail, Ordering::SeqCst);
    }

    /// Let `n` removes succeed, then fail every later one.
    pub fn fail_removes_after(&self, n: usize) {
        self.remove_budget.store(n as isize, Ordering::SeqCst);
    }

    pub fn heal(&self) {
        self.fail_upserts(false);
        self.remove_budget.store(-1, Ordering::SeqCst);
    }

    fn outage(op: &str) -> RagdError {
        RagdError::IndexUnavailable(format!("injected {} failure", op))
    }
}

impl VectorBackend for FlakyBackend {
    fn upsert(&self, entry: VectorEntry) -> RagdResult<()> {
        if self.fail_upserts.load(Ordering::SeqCst) {
            return Err(Self::outage("upsert"));
        }
        self.inner.upsert(entry)
    }

    fn get(&self, chunk_id: &ChunkId) -> RagdResult<Option<VectorEntry>> {
        self.inner.get(chunk_id)
    }

    fn remove(&self, chunk_id: &ChunkId) -> RagdResult<bool> {
        let budget = self.remove_budget.load(Ordering::SeqCst);
        if budget == 0 {
            return Err(Self::outage("remove"));
        }
        if budget > 0 {
            self.remove_budget.fetch_sub(1, Ordering::SeqCst);
        }
        self.inner.remove(chunk_id)
    }

    fn query(&self, vector: &[f32], k: usize, filter: &MetadataFilter) -> RagdResult<Vec<(ChunkId, f32)>> {
        self.inner.query(vector, k, filter)
    }

    fn len(&self) -> RagdResult<usize> {
        self.inner.len()
    }
}
