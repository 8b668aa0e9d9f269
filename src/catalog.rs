//! Cross-store coordination
//!
//! The relational store is authoritative. A chunk becomes searchable in
//! three steps: its row is written `Pending`, its vector entry is written,
//! then the row is marked `Complete`. A failure between steps leaves the
//! chunk `Pending`, and search never returns pending chunks, so the two
//! stores can be retried into agreement without readers noticing.

use crate::citation::{CitationAssembler, CitationBatch, ExcerptPolicy};
use crate::config::Config;
use crate::error::{RagdError, RagdResult};
use crate::id::{ChunkId, DocumentId};
use crate::index::{MetadataFilter, SearchHit, SqliteVectorBackend, VectorEntry, VectorIndex};
use crate::model::EmbeddingStatus;
use crate::provenance::ProvenanceTracker;
use crate::store::{ProvenanceStore, RecordStore, SqliteStore, StoreStats};
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What a document deletion removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeleteReport {
    pub chunks_removed: u32,
    pub vectors_removed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CatalogStats {
    #[serde(flatten)]
    pub store: StoreStats,
    pub vector_entries: usize,
}

/// Documents, chunks and vectors behind one consistent interface
pub struct Catalog {
    store: Arc<dyn RecordStore>,
    provenance: Arc<dyn ProvenanceStore>,
    index: VectorIndex,
    assembler: CitationAssembler,
    overfetch: usize,
}

impl Catalog {
    pub fn new<S: RecordStore + 'static>(store: Arc<S>, index: VectorIndex, config: &Config) -> Self {
        let provenance: Arc<dyn ProvenanceStore> = store.clone();
        let store: Arc<dyn RecordStore> = store;
        Self {
            assembler: CitationAssembler::new(Arc::clone(&store)),
            store,
            provenance,
            index,
            overfetch: config.ingest.search_overfetch.max(1),
        }
    }

    /// Open the persistent record store and vector index named by `config`.
    pub fn open(config: &Config) -> RagdResult<Self> {
        config.validate()?;
        let store = Arc::new(SqliteStore::open_with_config(config)?);
        let backend = Arc::new(SqliteVectorBackend::open(config.storage.vector_path())?);
        info!(
            db_path = %config.storage.db_path.display(),
            vector_path = %config.storage.vector_path().display(),
            "opened catalog"
        );
        Ok(Self::new(store, VectorIndex::from_config(backend, config), config))
    }

    pub fn with_excerpt_policy(mut self, policy: ExcerptPolicy) -> Self {
        self.assembler = CitationAssembler::new(Arc::clone(&self.store)).with_policy(policy);
        self
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn provenance(&self) -> ProvenanceTracker {
        ProvenanceTracker::new(Arc::clone(&self.provenance))
    }

    /// Write a chunk's vector entry and mark the chunk `Complete`.
    ///
    /// If the vector write fails the chunk stays `Pending` and the error
    /// is returned; calling again is safe.
    pub fn index_chunk(&self, chunk_id: &ChunkId, embedding: Vec<f32>) -> RagdResult<()> {
        let chunk = self.store.get_chunk(chunk_id)?;
        let doc = self.store.get_document(&chunk.doc_id)?;
        let indexed_at = Utc::now();
        self.index.index_chunk(&chunk, &doc, embedding, indexed_at)?;
        self.store
            .update_embedding_metadata(chunk_id, &doc.embedding_model, indexed_at)
    }

    /// Similarity search restricted to chunks that are `Complete` under
    /// their document's current model.
    ///
    /// Hits that fail the check are skipped and the index is queried again
    /// with a larger `k` until `top_k` valid hits are found or the index
    /// has nothing more to return.
    pub fn search(
        &self,
        query: &[f32],
        model: &str,
        top_k: usize,
        filter: &MetadataFilter,
    ) -> RagdResult<Vec<SearchHit>> {
        if top_k == 0 {
            return Err(RagdError::InvalidArgument("top_k must be at least 1".into()));
        }
        let total = self.index.len()?;
        let mut k = top_k.saturating_mul(self.overfetch);
        let mut doc_models: HashMap<DocumentId, Option<String>> = HashMap::new();

        loop {
            let raw = self.index.search(query, model, k, filter)?;
            let exhausted = raw.len() < k || k >= total;
            let mut valid = Vec::with_capacity(top_k);

            for hit in raw {
                if self.is_servable(&hit.chunk_id, &mut doc_models)? {
                    valid.push(hit);
                    if valid.len() == top_k {
                        break;
                    }
                } else {
                    debug!(chunk_id = %hit.chunk_id, "skipping stale or pending hit");
                }
            }

            if valid.len() == top_k || exhausted {
                return Ok(valid);
            }
            k = k.saturating_mul(2);
        }
    }

    fn is_servable(
        &self,
        chunk_id: &ChunkId,
        doc_models: &mut HashMap<DocumentId, Option<String>>,
    ) -> RagdResult<bool> {
        let chunk = match self.store.get_chunk(chunk_id) {
            Ok(chunk) => chunk,
            Err(e) if e.is_not_found() => return Ok(false),
            Err(e) => return Err(e),
        };
        if chunk.embedding_status != EmbeddingStatus::Complete {
            return Ok(false);
        }
        if !doc_models.contains_key(&chunk.doc_id) {
            let model = match self.store.get_document(&chunk.doc_id) {
                Ok(doc) => Some(doc.embedding_model),
                Err(e) if e.is_not_found() => None,
                Err(e) => return Err(e),
            };
            doc_models.insert(chunk.doc_id.clone(), model);
        }
        let current = doc_models.get(&chunk.doc_id).and_then(Option::as_deref);
        Ok(current.is_some() && chunk.embedding_model.as_deref() == current)
    }

    /// Delete a document from both stores, or from neither.
    ///
    /// Without `cascade` a document that owns chunks is refused with
    /// `HasDependents`. With it, vector entries are removed first, then the
    /// relational rows in one transaction. On failure every removed entry
    /// is written back before the error is returned.
    pub fn delete_document(&self, doc_id: &DocumentId, cascade: bool) -> RagdResult<DeleteReport> {
        let chunks = self.store.chunks_for_document(doc_id)?;
        if !chunks.is_empty() && !cascade {
            return Err(RagdError::HasDependents {
                doc_id: doc_id.clone(),
                chunk_count: chunks.len() as u32,
            });
        }

        let mut snapshot: Vec<VectorEntry> = Vec::new();
        for chunk in &chunks {
            if let Some(entry) = self.index.get_entry(&chunk.chunk_id)? {
                snapshot.push(entry);
            }
        }

        for (i, entry) in snapshot.iter().enumerate() {
            if let Err(e) = self.index.remove_chunk(&entry.chunk_id) {
                warn!(doc_id = %doc_id, error = %e, "vector removal failed, restoring entries");
                self.restore(&snapshot[..i]);
                return Err(e);
            }
        }

        match self.store.purge_document(doc_id) {
            Ok(chunks_removed) => {
                info!(doc_id = %doc_id, chunks_removed, vectors = snapshot.len(), "deleted document");
                Ok(DeleteReport {
                    chunks_removed,
                    vectors_removed: snapshot.len(),
                })
            }
            Err(e) => {
                warn!(doc_id = %doc_id, error = %e, "relational purge failed, restoring entries");
                self.restore(&snapshot);
                Err(e)
            }
        }
    }

    fn restore(&self, entries: &[VectorEntry]) {
        for entry in entries {
            if let Err(e) = self.index.restore_entry(entry.clone()) {
                // The chunk row still says Complete; retry_pending will not see it.
                error!(chunk_id = %entry.chunk_id, error = %e, "failed to restore vector entry");
            }
        }
    }

    pub fn assemble_citations(&self, hits: &[SearchHit]) -> RagdResult<CitationBatch> {
        self.assembler.assemble_citations(hits)
    }

    pub fn stats(&self) -> RagdResult<CatalogStats> {
        Ok(CatalogStats {
            store: self.store.stats()?,
            vector_entries: self.index.len()?,
        })
    }
}
