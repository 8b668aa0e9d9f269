//! Error taxonomy shared by every layer of the store.
//!
//! Each kind is a distinct variant so callers can branch on it. Variants
//! carry the identifiers involved so a presentation layer can build an
//! actionable message without re-querying.

use crate::id::{ChunkId, DocumentId};
use crate::validate::ChunkViolation;
use thiserror::Error;

/// The kind of entity a `NotFound` refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Document,
    Chunk,
    Tag,
    VectorEntry,
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Entity::Document => "document",
            Entity::Chunk => "chunk",
            Entity::Tag => "tag",
            Entity::VectorEntry => "vector entry",
        };
        f.write_str(name)
    }
}

/// Errors that can occur in ragd operations
#[derive(Debug, Error)]
pub enum RagdError {
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Chunk batch rejected at index {index}: {violation}")]
    ChunkConsistency {
        index: usize,
        violation: ChunkViolation,
    },

    #[error("Embedding for model '{model}' has {actual} dimensions, expected {expected}")]
    DimensionMismatch {
        model: String,
        expected: usize,
        actual: usize,
    },

    #[error("Document {doc_id} still owns {chunk_count} chunks; delete with cascade")]
    HasDependents {
        doc_id: DocumentId,
        chunk_count: u32,
    },

    #[error("Document {0} already has chunks")]
    AlreadyChunked(DocumentId),

    #[error("Vector index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("Chunk range {start_seq}..={end_seq} exceeds {chunk_count} chunks of document {doc_id}")]
    OutOfRange {
        doc_id: DocumentId,
        start_seq: u32,
        end_seq: u32,
        chunk_count: u32,
    },

    #[error("Tag '{tag}' on {entity_id} is already confirmed")]
    AlreadyConfirmed { entity_id: String, tag: String },

    #[error("{0} not found: {1}")]
    NotFound(Entity, String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Embedding provider error: {0}")]
    Embedding(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Ingest worker failed: {0}")]
    Worker(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Date parsing error: {0}")]
    DateParse(String),
}

impl RagdError {
    pub(crate) fn document_not_found(id: &DocumentId) -> Self {
        RagdError::NotFound(Entity::Document, id.to_string())
    }

    pub(crate) fn chunk_not_found(id: &ChunkId) -> Self {
        RagdError::NotFound(Entity::Chunk, id.to_string())
    }

    /// True when the condition is transient and the same call may succeed later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RagdError::IndexUnavailable(_) | RagdError::Embedding(_))
    }

    /// True for legitimate absence, as opposed to "could not verify".
    pub fn is_not_found(&self) -> bool {
        matches!(self, RagdError::NotFound(..))
    }
}

/// Result type for ragd operations
pub type RagdResult<T> = Result<T, RagdError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_unavailable_is_retryable_but_not_found_is_not() {
        assert!(RagdError::IndexUnavailable("connection refused".into()).is_retryable());
        let missing = RagdError::NotFound(Entity::Chunk, "abc#chunk_000".into());
        assert!(!missing.is_retryable());
        assert!(missing.is_not_found());
    }

    #[test]
    fn not_found_message_names_entity() {
        let err = RagdError::NotFound(Entity::VectorEntry, "d#chunk_001".into());
        assert_eq!(err.to_string(), "vector entry not found: d#chunk_001");
    }
}
