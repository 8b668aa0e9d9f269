//! Relational record store
//!
//! Documents, chunks, tags and the provenance log live behind the
//! `DocumentStore`, `ChunkStore` and `ProvenanceStore` traits. The primary
//! implementation is `SqliteStore`.

mod sqlite;
mod traits;

pub use sqlite::SqliteStore;
pub use traits::{
    ChunkStore, DocumentStore, KeywordHit, OpenStore, ProvenanceStore, RecordStore, RescanStatus,
    StoreStats,
};
