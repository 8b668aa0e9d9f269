//! Core data model: documents, chunks, tags and citations

mod chunk;
mod citation;
mod document;
mod tag;

pub use chunk::{content_hash, normalize_content, Chunk, ChunkDraft, EmbeddingStatus};
pub use citation::Citation;
pub use document::{DocType, Document};
pub use tag::{tag_matches, TagEntry, TagQuery, TagSource};

pub(crate) use chunk::skip_chars;
pub(crate) use tag::check_confidence;
