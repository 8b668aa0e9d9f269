//! Query-time citation objects

use crate::id::{ChunkId, DocumentId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A retrieved chunk attributed back to its document, page and section.
///
/// Assembled on demand; never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub doc_id: DocumentId,
    pub title: Option<String>,
    pub author: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub source_path: String,
    pub chunk_id: ChunkId,
    pub page_numbers: Vec<u32>,
    pub section_heading: Option<String>,
    pub char_start: u64,
    pub char_end: u64,
    /// Similarity in [0.0, 1.0]
    pub retrieval_score: f32,
    pub excerpt: String,
}
