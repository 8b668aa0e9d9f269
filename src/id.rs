//! Identifier scheme for documents and chunks
//!
//! Document IDs are content-addressed (UUID v5 over the source hash), so
//! re-ingesting identical bytes yields the same ID without a central
//! allocator. Chunk IDs are derived as `{doc_id}#chunk_{seq:03}` and can be
//! split back into their parts without touching storage.

use crate::error::{RagdError, RagdResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Namespace for content-addressed document IDs.
const DOCUMENT_NAMESPACE: Uuid = Uuid::from_u128(0x6c0f_3a52_8d4e_4b1f_9a77_2e5d_1c3b_0a91);

/// Separator between a document ID and the chunk suffix.
const CHUNK_SEPARATOR: &str = "#chunk_";

/// Unique identifier for a document
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentId(String);

impl DocumentId {
    /// Deterministic ID for a content hash. Same hash, same ID.
    pub fn for_content(source_hash: &str) -> Self {
        Self(Uuid::new_v5(&DOCUMENT_NAMESPACE, source_hash.as_bytes()).to_string())
    }

    /// Create a new random DocumentId (UUID v4)
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Validate and wrap an existing identifier string.
    pub fn parse(id: impl Into<String>) -> RagdResult<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(RagdError::InvalidIdentifier("document id is empty".into()));
        }
        if id.trim() != id {
            return Err(RagdError::InvalidIdentifier(format!(
                "document id has surrounding whitespace: {:?}",
                id
            )));
        }
        if id.contains('#') {
            return Err(RagdError::InvalidIdentifier(format!(
                "document id must not contain '#': {}",
                id
            )));
        }
        Ok(Self(id))
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for DocumentId {
    type Error = RagdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<DocumentId> for String {
    fn from(id: DocumentId) -> Self {
        id.0
    }
}

impl FromStr for DocumentId {
    type Err = RagdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Produce the ID a document with this content hash will carry.
pub fn new_document_id(source_hash: &str) -> RagdResult<DocumentId> {
    if source_hash.trim().is_empty() {
        return Err(RagdError::InvalidIdentifier("source hash is empty".into()));
    }
    Ok(DocumentId::for_content(source_hash))
}

/// Identifier of a chunk: owning document plus sequence number
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChunkId {
    doc_id: DocumentId,
    sequence_num: u32,
}

impl ChunkId {
    pub fn new(doc_id: &DocumentId, sequence_num: u32) -> Self {
        Self {
            doc_id: doc_id.clone(),
            sequence_num,
        }
    }

    /// Split a chunk ID string back into document ID and sequence number.
    pub fn parse(s: &str) -> RagdResult<Self> {
        let (doc_part, seq_part) = s.split_once(CHUNK_SEPARATOR).ok_or_else(|| {
            RagdError::InvalidIdentifier(format!("missing '{}' in chunk id: {}", CHUNK_SEPARATOR, s))
        })?;
        let doc_id = DocumentId::parse(doc_part)?;
        if seq_part.len() < 3 || !seq_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(RagdError::InvalidIdentifier(format!(
                "malformed sequence number in chunk id: {}",
                s
            )));
        }
        let sequence_num: u32 = seq_part.parse().map_err(|_| {
            RagdError::InvalidIdentifier(format!("sequence number out of range in chunk id: {}", s))
        })?;
        let id = Self { doc_id, sequence_num };
        // Only the canonical zero-padding round-trips ("chunk_0001" does not).
        if id.to_string() != s {
            return Err(RagdError::InvalidIdentifier(format!(
                "non-canonical chunk id: {}",
                s
            )));
        }
        Ok(id)
    }

    pub fn doc_id(&self) -> &DocumentId {
        &self.doc_id
    }

    pub fn sequence_num(&self) -> u32 {
        self.sequence_num
    }
}

impl std::fmt::Display for ChunkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}{:03}", self.doc_id, CHUNK_SEPARATOR, self.sequence_num)
    }
}

impl PartialOrd for ChunkId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Ordered by the string form, which is what search tie-breaking uses.
impl Ord for ChunkId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.to_string().cmp(&other.to_string())
    }
}

impl TryFrom<String> for ChunkId {
    type Error = RagdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ChunkId> for String {
    fn from(id: ChunkId) -> Self {
        id.to_string()
    }
}

impl FromStr for ChunkId {
    type Err = RagdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Derive a chunk ID from untyped input.
///
/// Fails with `InvalidIdentifier` for an empty or malformed document ID
/// and for negative or oversized sequence numbers.
pub fn chunk_id_for(doc_id: &str, sequence_num: i64) -> RagdResult<ChunkId> {
    let doc_id = DocumentId::parse(doc_id)?;
    let sequence_num = u32::try_from(sequence_num).map_err(|_| {
        RagdError::InvalidIdentifier(format!("sequence number out of range: {}", sequence_num))
    })?;
    Ok(ChunkId::new(&doc_id, sequence_num))
}
