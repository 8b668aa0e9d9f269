//! Chunk records: the unit of retrieval

use crate::error::RagdError;
use crate::id::{ChunkId, DocumentId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Progress of a chunk through the two-phase relational/vector write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingStatus {
    /// Relational row written; the vector entry may not exist
    Pending,
    /// Vector entry written for the chunk's recorded model
    Complete,
}

impl EmbeddingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmbeddingStatus::Pending => "pending",
            EmbeddingStatus::Complete => "complete",
        }
    }
}

impl std::str::FromStr for EmbeddingStatus {
    type Err = RagdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "complete" => Ok(Self::Complete),
            _ => Err(RagdError::InvalidArgument(format!(
                "unknown embedding status: {}",
                s
            ))),
        }
    }
}

/// A chunk as produced by the external chunker, before insertion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkDraft {
    pub sequence_num: u32,
    /// Character offset (Unicode scalar values) of the first character
    pub char_start: u64,
    /// Exclusive end offset
    pub char_end: u64,
    pub content: String,
    pub page_numbers: Vec<u32>,
    pub section_heading: Option<String>,
    pub overlap_prev_chars: u64,
    pub overlap_next_chars: u64,
}

impl ChunkDraft {
    /// Draft covering `content` starting at `char_start`; `char_end` is derived.
    pub fn new(sequence_num: u32, char_start: u64, content: impl Into<String>) -> Self {
        let content = content.into();
        let len = content.chars().count() as u64;
        Self {
            sequence_num,
            char_start,
            char_end: char_start + len,
            content,
            page_numbers: Vec::new(),
            section_heading: None,
            overlap_prev_chars: 0,
            overlap_next_chars: 0,
        }
    }

    pub fn with_pages(mut self, pages: impl IntoIterator<Item = u32>) -> Self {
        self.page_numbers = pages.into_iter().collect();
        self
    }

    pub fn with_section(mut self, heading: impl Into<String>) -> Self {
        self.section_heading = Some(heading.into());
        self
    }

    pub fn with_overlap(mut self, prev: u64, next: u64) -> Self {
        self.overlap_prev_chars = prev;
        self.overlap_next_chars = next;
        self
    }
}

/// A persisted chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: ChunkId,
    pub doc_id: DocumentId,
    pub sequence_num: u32,
    pub char_start: u64,
    pub char_end: u64,
    pub content: String,
    pub content_hash: String,
    pub page_numbers: Vec<u32>,
    pub section_heading: Option<String>,
    pub overlap_prev_chars: u64,
    pub overlap_next_chars: u64,
    pub prev_chunk_id: Option<ChunkId>,
    pub next_chunk_id: Option<ChunkId>,
    pub embedding_model: Option<String>,
    pub embedding_timestamp: Option<DateTime<Utc>>,
    pub embedding_status: EmbeddingStatus,
}

impl Chunk {
    /// Materialize a validated draft at position `sequence_num` of a batch of `total`.
    pub(crate) fn from_draft(doc_id: &DocumentId, draft: &ChunkDraft, total: u32) -> Self {
        let seq = draft.sequence_num;
        Self {
            chunk_id: ChunkId::new(doc_id, seq),
            doc_id: doc_id.clone(),
            sequence_num: seq,
            char_start: draft.char_start,
            char_end: draft.char_end,
            content: draft.content.clone(),
            content_hash: content_hash(&draft.content),
            page_numbers: draft.page_numbers.clone(),
            section_heading: draft.section_heading.clone(),
            overlap_prev_chars: draft.overlap_prev_chars,
            overlap_next_chars: draft.overlap_next_chars,
            prev_chunk_id: seq.checked_sub(1).map(|p| ChunkId::new(doc_id, p)),
            next_chunk_id: (seq + 1 < total).then(|| ChunkId::new(doc_id, seq + 1)),
            embedding_model: None,
            embedding_timestamp: None,
            embedding_status: EmbeddingStatus::Pending,
        }
    }

    pub fn first_page(&self) -> Option<u32> {
        self.page_numbers.first().copied()
    }

    /// Content with the leading overlap removed; concatenating these
    /// across a document reconstructs its text.
    pub fn unique_content(&self) -> &str {
        skip_chars(&self.content, self.overlap_prev_chars as usize)
    }
}

/// Collapse whitespace runs and trim, so formatting-only differences hash equal.
pub fn normalize_content(content: &str) -> String {
    content.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// SHA-256 hex of the normalized content.
pub fn content_hash(content: &str) -> String {
    hex::encode(Sha256::digest(normalize_content(content).as_bytes()))
}

/// Slice off the first `n` characters without splitting a scalar value.
pub(crate) fn skip_chars(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((byte, _)) => &s[byte..],
        None => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draft_derives_end_from_char_count() {
        let draft = ChunkDraft::new(0, 10, "héllo");
        assert_eq!(draft.char_end, 15);
    }

    #[test]
    fn content_hash_ignores_whitespace_layout() {
        assert_eq!(content_hash("a  b\n c "), content_hash("a b c"));
        assert_ne!(content_hash("a b c"), content_hash("a b d"));
    }

    #[test]
    fn from_draft_links_neighbours() {
        let doc = DocumentId::parse("doc").unwrap();
        let first = Chunk::from_draft(&doc, &ChunkDraft::new(0, 0, "ab"), 3);
        let middle = Chunk::from_draft(&doc, &ChunkDraft::new(1, 2, "cd"), 3);
        let last = Chunk::from_draft(&doc, &ChunkDraft::new(2, 4, "ef"), 3);
        assert_eq!(first.prev_chunk_id, None);
        assert_eq!(first.next_chunk_id.as_ref().map(|c| c.sequence_num()), Some(1));
        assert_eq!(middle.prev_chunk_id.as_ref().map(|c| c.sequence_num()), Some(0));
        assert_eq!(last.next_chunk_id, None);
        assert_eq!(last.embedding_status, EmbeddingStatus::Pending);
    }

    #[test]
    fn unique_content_strips_leading_overlap() {
        let doc = DocumentId::parse("doc").unwrap();
        let chunk = Chunk::from_draft(&doc, &ChunkDraft::new(1, 3, "éfgh").with_overlap(2, 0), 2);
        assert_eq!(chunk.unique_content(), "gh");
    }
}
