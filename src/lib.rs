//! ragd: document, chunk and citation metadata for retrieval
//!
//! Keeps a relational record of every ingested document and its ordered,
//! overlapping chunks next to a vector index of chunk embeddings, and keeps
//! the two consistent. Search hits resolve back to page-accurate citations.
//!
//! # Core Concepts
//!
//! - **Documents**: one record per distinct source content, identified by a
//!   content-derived ID
//! - **Chunks**: contiguous, overlapping text segments that tile a document
//!   and link to their neighbours
//! - **Vector entries**: one embedding per chunk with a flat metadata
//!   snapshot for filtered search
//! - **Provenance**: an append-only log of derived metadata such as tags
//!
//! # Example
//!
//! ```
//! use ragd::{ChunkDraft, ChunkStore, Document, DocumentStore, OpenStore, SqliteStore};
//!
//! let store = SqliteStore::open_in_memory().unwrap();
//! let doc = Document::from_text("notes.txt", "hello world", "mini-embed");
//! let doc_id = store.upsert_document(&doc).unwrap();
//! store.insert_chunks(&doc_id, &[ChunkDraft::new(0, 0, "hello world")]).unwrap();
//! assert_eq!(store.chunk_count(&doc_id).unwrap(), 1);
//! ```

pub mod catalog;
pub mod citation;
pub mod config;
mod error;
mod id;
pub mod index;
pub mod ingest;
pub mod model;
pub mod provenance;
pub mod store;
pub mod validate;

pub use catalog::{Catalog, CatalogStats, DeleteReport};
pub use citation::{format_reference, CitationAssembler, CitationBatch, DriftKind, DriftWarning, ExcerptPolicy};
pub use config::{load_config, parse_config, Config};
pub use error::{Entity, RagdError, RagdResult};
pub use id::{chunk_id_for, new_document_id, ChunkId, DocumentId};
pub use index::{MetadataFilter, SearchHit, VectorBackend, VectorIndex};
pub use ingest::{CancellationToken, Embedder, EmbeddingError, IngestPipeline, IngestRequest};
pub use model::{Chunk, ChunkDraft, Citation, Document, EmbeddingStatus, TagEntry, TagQuery, TagSource};
pub use provenance::ProvenanceTracker;
pub use store::{ChunkStore, DocumentStore, OpenStore, ProvenanceStore, RecordStore, SqliteStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
