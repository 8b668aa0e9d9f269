//! Record store trait definitions

use crate::error::RagdResult;
use crate::id::{ChunkId, DocumentId};
use crate::model::{Chunk, ChunkDraft, Document, EmbeddingStatus, TagEntry, TagQuery};
use crate::provenance::{ProvenanceEntry, ProvenanceRecord};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;

/// What a re-scan of a source path found
#[derive(Debug, Clone, PartialEq)]
pub enum RescanStatus {
    /// No record exists for the path
    New,
    /// The newest record for the path has the same content hash
    Unchanged(Document),
    /// The content changed; `previous` is the newest existing record
    Changed { previous: Document },
}

/// One full-text match over chunk content
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeywordHit {
    pub chunk_id: ChunkId,
    /// BM25 relevance, higher is better
    pub score: f64,
}

/// Row counts for diagnostics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub documents: u64,
    pub chunks: u64,
    pub pending_chunks: u64,
    pub complete_chunks: u64,
    pub tags: u64,
    pub provenance_entries: u64,
}

/// Document-level operations
///
/// Implementations must be thread-safe (Send + Sync) to support
/// concurrent ingestion workers.
pub trait DocumentStore: Send + Sync {
    /// Insert a document, or refresh the existing record with the same
    /// `source_hash`. Returns the ID of the persisted record.
    fn upsert_document(&self, doc: &Document) -> RagdResult<DocumentId>;

    fn get_document(&self, id: &DocumentId) -> RagdResult<Document>;

    /// Most recently ingested record for a path
    fn find_by_source_path(&self, path: &str) -> RagdResult<Document>;

    /// Every record for a path, newest first
    fn list_versions(&self, path: &str) -> RagdResult<Vec<Document>>;

    fn classify_rescan(&self, path: &str, source_hash: &str) -> RagdResult<RescanStatus>;

    /// Documents ordered by ingestion date, filtered on confirmed tags
    fn list_documents(&self, filter: Option<&TagQuery>) -> RagdResult<Vec<Document>>;

    /// Switch a document's embedding model. Chunks embedded with any other
    /// model go back to `Pending`; returns how many did.
    fn set_embedding_model(&self, id: &DocumentId, model: &str) -> RagdResult<u32>;

    /// Remove a document with its chunks and tags in one transaction.
    /// Returns the number of chunks removed.
    fn purge_document(&self, id: &DocumentId) -> RagdResult<u32>;
}

/// Chunk-level operations
pub trait ChunkStore: Send + Sync {
    /// Validate and insert the full chunk batch of a document.
    fn insert_chunks(&self, doc_id: &DocumentId, drafts: &[ChunkDraft]) -> RagdResult<Vec<ChunkId>>;

    fn get_chunk(&self, id: &ChunkId) -> RagdResult<Chunk>;

    /// Chunks `start_seq..=end_seq` in sequence order
    fn get_chunks_in_range(
        &self,
        doc_id: &DocumentId,
        start_seq: u32,
        end_seq: u32,
    ) -> RagdResult<Vec<Chunk>>;

    /// All chunks of a document in sequence order
    fn chunks_for_document(&self, doc_id: &DocumentId) -> RagdResult<Vec<Chunk>>;

    /// Record a completed embedding and mark the chunk `Complete`.
    fn update_embedding_metadata(
        &self,
        id: &ChunkId,
        model: &str,
        timestamp: DateTime<Utc>,
    ) -> RagdResult<()>;

    fn chunks_by_status(&self, status: EmbeddingStatus, limit: usize) -> RagdResult<Vec<Chunk>>;

    fn keyword_search(&self, query: &str, limit: usize) -> RagdResult<Vec<KeywordHit>>;

    fn stats(&self) -> RagdResult<StoreStats>;

    /// Up to `before` preceding and `after` following chunks around `id`,
    /// clamped to the document, including the chunk itself.
    fn context_window(&self, id: &ChunkId, before: u32, after: u32) -> RagdResult<Vec<Chunk>> {
        let doc = id.doc_id();
        let seq = id.sequence_num();
        // Surfaces NotFound for unknown chunks before computing a range.
        self.get_chunk(id)?;
        let count = self.chunk_count(doc)?;
        let start = seq.saturating_sub(before);
        let end = seq.saturating_add(after).min(count.saturating_sub(1));
        self.get_chunks_in_range(doc, start, end)
    }

    /// Pending chunks of one document
    fn pending_chunks(&self, doc_id: &DocumentId) -> RagdResult<Vec<Chunk>> {
        Ok(self
            .chunks_for_document(doc_id)?
            .into_iter()
            .filter(|c| c.embedding_status == EmbeddingStatus::Pending)
            .collect())
    }

    fn chunk_count(&self, doc_id: &DocumentId) -> RagdResult<u32>;
}

/// Append-only provenance log and tag registry
pub trait ProvenanceStore: Send + Sync {
    fn append_provenance(&self, record: &ProvenanceRecord) -> RagdResult<ProvenanceEntry>;

    /// Append a provenance entry and register `tag` on the same entity,
    /// atomically. An existing tag with the same name is left untouched.
    fn append_with_tag(&self, record: &ProvenanceRecord, tag: &TagEntry) -> RagdResult<ProvenanceEntry>;

    /// Confirm an unconfirmed tag and append `record` in one transaction.
    fn confirm_tag(
        &self,
        entity_id: &str,
        name: &str,
        record: &ProvenanceRecord,
    ) -> RagdResult<ProvenanceEntry>;

    fn get_tag(&self, entity_id: &str, name: &str) -> RagdResult<Option<TagEntry>>;

    /// Tags on an entity by name; `confirmed` narrows to one state.
    fn list_tags(&self, entity_id: &str, confirmed: Option<bool>) -> RagdResult<Vec<TagEntry>>;

    /// Entries with `id > after_id`, oldest first
    fn provenance_page(
        &self,
        entity_id: &str,
        after_id: i64,
        limit: usize,
    ) -> RagdResult<Vec<ProvenanceEntry>>;
}

/// Every relational capability the catalog coordinates
pub trait RecordStore: DocumentStore + ChunkStore + ProvenanceStore {}

impl<T: DocumentStore + ChunkStore + ProvenanceStore> RecordStore for T {}

/// Extension trait for opening stores from paths
pub trait OpenStore: RecordStore + Sized {
    /// Open or create a store at the given path
    fn open(path: impl AsRef<Path>) -> RagdResult<Self>;

    /// Create an in-memory store (useful for testing)
    fn open_in_memory() -> RagdResult<Self>;
}
