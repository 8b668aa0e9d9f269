//! Document ingestion: records first, vectors second
//!
//! Each document is upserted, its chunk batch is committed as `Pending`,
//! then chunks are embedded and indexed one batch at a time. Embedding or
//! index outages leave chunks `Pending` for `retry_pending` instead of
//! failing the document.

use super::cancel::CancellationToken;
use super::embedder::{embed_exact, Embedder};
use crate::catalog::Catalog;
use crate::config::Config;
use crate::error::{RagdError, RagdResult};
use crate::id::DocumentId;
use crate::model::{Chunk, ChunkDraft, Document, EmbeddingStatus};
use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

const DEFAULT_EMBED_BATCH: usize = 32;

/// A document record together with its externally produced chunks
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub document: Document,
    pub chunks: Vec<ChunkDraft>,
}

impl IngestRequest {
    pub fn new(document: Document, chunks: Vec<ChunkDraft>) -> Self {
        Self { document, chunks }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStatus {
    /// The chunk batch was written by this call
    Inserted,
    /// The content was already ingested; only pending chunks were resumed
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestOutcome {
    pub doc_id: DocumentId,
    pub status: IngestStatus,
    /// Chunks that became searchable during this call
    pub indexed: usize,
    /// Chunks still waiting for a vector entry
    pub pending: usize,
}

/// Counts from an embed-and-index pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    pub indexed: usize,
    pub pending: usize,
    /// Pending chunks left alone because their document uses another model
    pub skipped: usize,
}

#[derive(Debug)]
pub struct IngestFailure {
    /// Position of the request in the submitted batch
    pub position: usize,
    pub source_path: String,
    pub error: RagdError,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    /// Successful documents in submission order
    pub outcomes: Vec<IngestOutcome>,
    pub failures: Vec<IngestFailure>,
    /// Requests never started because the batch was cancelled
    pub cancelled: usize,
}

impl BatchReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.cancelled == 0
    }
}

/// Drives documents through the catalog with one embedding provider.
#[derive(Clone)]
pub struct IngestPipeline {
    catalog: Arc<Catalog>,
    embedder: Arc<dyn Embedder>,
    workers: usize,
    embed_batch: usize,
}

impl IngestPipeline {
    pub fn new(catalog: Arc<Catalog>, embedder: Arc<dyn Embedder>, config: &Config) -> Self {
        Self {
            catalog,
            embedder,
            workers: config.ingest.workers.max(1),
            embed_batch: DEFAULT_EMBED_BATCH,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Number of chunk texts passed to a single `embed_batch` call.
    pub fn with_embed_batch_size(mut self, size: usize) -> Self {
        self.embed_batch = size.max(1);
        self
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Ingest one document.
    ///
    /// Re-ingesting content that is already stored writes no new records;
    /// it only retries that document's pending chunks.
    pub fn ingest_one(&self, request: IngestRequest) -> RagdResult<IngestOutcome> {
        let IngestRequest { document, chunks } = request;
        if document.embedding_model != self.embedder.model_name() {
            return Err(RagdError::InvalidArgument(format!(
                "document model '{}' does not match embedder '{}'",
                document.embedding_model,
                self.embedder.model_name()
            )));
        }

        let store = self.catalog.store();
        let doc_id = store.upsert_document(&document)?;
        if store.chunk_count(&doc_id)? > 0 {
            return self.resume(doc_id);
        }
        match store.insert_chunks(&doc_id, &chunks) {
            Ok(_) => {}
            // Another worker committed the same content first.
            Err(RagdError::AlreadyChunked(_)) => return self.resume(doc_id),
            Err(e) => return Err(e),
        }

        let inserted = store.chunks_for_document(&doc_id)?;
        let report = self.index_chunks(self.embedder.as_ref(), &inserted)?;
        info!(
            doc_id = %doc_id,
            source_path = %document.source_path,
            chunks = inserted.len(),
            indexed = report.indexed,
            pending = report.pending,
            "ingested document"
        );
        Ok(IngestOutcome {
            doc_id,
            status: IngestStatus::Inserted,
            indexed: report.indexed,
            pending: report.pending,
        })
    }

    fn resume(&self, doc_id: DocumentId) -> RagdResult<IngestOutcome> {
        let store = self.catalog.store();
        let pending = store.pending_chunks(&doc_id)?;
        let doc = store.get_document(&doc_id)?;
        let report = if pending.is_empty() || doc.embedding_model != self.embedder.model_name() {
            IndexReport {
                pending: pending.len(),
                ..IndexReport::default()
            }
        } else {
            self.index_chunks(self.embedder.as_ref(), &pending)?
        };
        debug!(doc_id = %doc_id, resumed = report.indexed, pending = report.pending, "document unchanged");
        Ok(IngestOutcome {
            doc_id,
            status: IngestStatus::Unchanged,
            indexed: report.indexed,
            pending: report.pending,
        })
    }

    /// Ingest `requests` on a bounded worker pool.
    ///
    /// `cancel` is checked before each document starts. Documents already
    /// running finish normally and appear in the report.
    pub async fn ingest_batch(
        &self,
        requests: Vec<IngestRequest>,
        cancel: &CancellationToken,
    ) -> BatchReport {
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut join_set: JoinSet<(usize, String, RagdResult<IngestOutcome>)> = JoinSet::new();
        let mut report = BatchReport::default();
        let total = requests.len();

        for (position, request) in requests.into_iter().enumerate() {
            if cancel.is_cancelled() {
                report.cancelled = total - position;
                break;
            }
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    report.cancelled = total - position;
                    break;
                }
            };
            // A worker may have cancelled while this request waited for a slot.
            if cancel.is_cancelled() {
                report.cancelled = total - position;
                break;
            }

            let pipeline = self.clone();
            let source_path = request.document.source_path.clone();
            join_set.spawn(async move {
                let result = tokio::task::spawn_blocking(move || {
                    let _permit = permit;
                    pipeline.ingest_one(request)
                })
                .await
                .unwrap_or_else(|e| Err(RagdError::Worker(e.to_string())));
                (position, source_path, result)
            });
        }

        if report.cancelled > 0 {
            info!(cancelled = report.cancelled, "batch cancelled, finishing in-flight documents");
        }

        let mut outcomes = Vec::with_capacity(total);
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((position, _, Ok(outcome))) => outcomes.push((position, outcome)),
                Ok((position, source_path, Err(error))) => {
                    warn!(source_path = %source_path, error = %error, "document ingestion failed");
                    report.failures.push(IngestFailure {
                        position,
                        source_path,
                        error,
                    });
                }
                Err(e) => warn!(error = %e, "ingest task aborted"),
            }
        }

        outcomes.sort_by_key(|(position, _)| *position);
        report.outcomes = outcomes.into_iter().map(|(_, outcome)| outcome).collect();
        report.failures.sort_by_key(|f| f.position);
        report
    }

    /// Embed and index up to `limit` pending chunks whose document uses
    /// this pipeline's model.
    pub fn retry_pending(&self, limit: usize) -> RagdResult<IndexReport> {
        let store = self.catalog.store();
        let mut models: HashMap<DocumentId, String> = HashMap::new();
        let mut eligible = Vec::new();
        let mut skipped = 0;

        for chunk in store.chunks_by_status(EmbeddingStatus::Pending, limit)? {
            let model = match models.entry(chunk.doc_id.clone()) {
                Entry::Occupied(e) => e.into_mut(),
                Entry::Vacant(e) => e.insert(store.get_document(&chunk.doc_id)?.embedding_model),
            };
            if model.as_str() == self.embedder.model_name() {
                eligible.push(chunk);
            } else {
                skipped += 1;
            }
        }

        let report = IndexReport {
            skipped,
            ..self.index_chunks(self.embedder.as_ref(), &eligible)?
        };
        info!(
            indexed = report.indexed,
            pending = report.pending,
            skipped = report.skipped,
            "retried pending chunks"
        );
        Ok(report)
    }

    /// Switch a document to `embedder`'s model and re-embed its chunks.
    ///
    /// Every chunk is reset to `Pending` first, so entries made with the
    /// previous model are never served while the migration runs.
    pub fn migrate_model(&self, doc_id: &DocumentId, embedder: &dyn Embedder) -> RagdResult<IndexReport> {
        let model = embedder.model_name();
        self.catalog.index().dimensions_for(model)?;
        let store = self.catalog.store();
        let reset = store.set_embedding_model(doc_id, model)?;
        info!(doc_id = %doc_id, model, reset, "migrating document to new embedding model");
        let chunks = store.pending_chunks(doc_id)?;
        self.index_chunks(embedder, &chunks)
    }

    fn index_chunks(&self, embedder: &dyn Embedder, chunks: &[Chunk]) -> RagdResult<IndexReport> {
        let mut report = IndexReport::default();
        for batch in chunks.chunks(self.embed_batch) {
            let texts: Vec<&str> = batch.iter().map(|c| c.content.as_str()).collect();
            let vectors = match embed_exact(embedder, &texts) {
                Ok(vectors) => vectors,
                Err(e) => {
                    warn!(model = embedder.model_name(), chunks = batch.len(), error = %e, "embedding failed, chunks left pending");
                    report.pending += batch.len();
                    continue;
                }
            };
            for (chunk, vector) in batch.iter().zip(vectors) {
                match self.catalog.index_chunk(&chunk.chunk_id, vector) {
                    Ok(()) => report.indexed += 1,
                    Err(e) if e.is_retryable() => {
                        warn!(chunk_id = %chunk.chunk_id, error = %e, "vector write failed, chunk left pending");
                        report.pending += 1;
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(report)
    }
}
