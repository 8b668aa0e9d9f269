//! Vector index adapter
//!
//! Keeps embeddings and a flat metadata snapshot per chunk in a
//! `VectorBackend`, and answers similarity queries with deterministic
//! ordering. Backends report cosine *distance*; the adapter converts it
//! to a similarity score in `[0, 1]`.

mod memory;
mod sqlite;

pub use memory::InMemoryVectorBackend;
pub use sqlite::SqliteVectorBackend;

use crate::config::Config;
use crate::error::{RagdError, RagdResult};
use crate::id::ChunkId;
use crate::model::{Chunk, Document};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// A scalar metadata value. Vector databases only accept flat scalars,
/// so lists are stored comma-joined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Str(String),
    Int(i64),
    Float(f64),
    Null,
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        MetadataValue::Str(s.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        MetadataValue::Str(s)
    }
}

impl From<i64> for MetadataValue {
    fn from(v: i64) -> Self {
        MetadataValue::Int(v)
    }
}

impl From<u32> for MetadataValue {
    fn from(v: u32) -> Self {
        MetadataValue::Int(v as i64)
    }
}

impl From<u64> for MetadataValue {
    fn from(v: u64) -> Self {
        MetadataValue::Int(v as i64)
    }
}

impl From<f64> for MetadataValue {
    fn from(v: f64) -> Self {
        MetadataValue::Float(v)
    }
}

impl<T: Into<MetadataValue>> From<Option<T>> for MetadataValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(MetadataValue::Null, Into::into)
    }
}

/// Flat metadata attached to a vector entry
pub type Metadata = BTreeMap<String, MetadataValue>;

/// One embedding with its chunk metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorEntry {
    pub chunk_id: ChunkId,
    pub vector: Vec<f32>,
    pub metadata: Metadata,
}

/// Flatten chunk and document fields into the vector-side metadata map.
pub fn flatten_metadata(chunk: &Chunk, doc: &Document, indexed_at: DateTime<Utc>) -> Metadata {
    let join = |items: Vec<String>| items.join(",");
    let mut m = Metadata::new();
    m.insert("doc_id".into(), doc.doc_id.as_str().into());
    m.insert("chunk_id".into(), chunk.chunk_id.to_string().into());
    m.insert("chunk_index".into(), chunk.sequence_num.into());
    m.insert("char_start".into(), chunk.char_start.into());
    m.insert("char_end".into(), chunk.char_end.into());
    m.insert("page".into(), chunk.first_page().into());
    m.insert(
        "pages".into(),
        join(chunk.page_numbers.iter().map(u32::to_string).collect()).into(),
    );
    m.insert("section".into(), chunk.section_heading.clone().into());
    m.insert("source".into(), doc.source_path.as_str().into());
    m.insert("title".into(), doc.title.clone().into());
    m.insert("author".into(), doc.author().into());
    m.insert("date".into(), doc.date_created.map(|d| d.to_rfc3339()).into());
    m.insert("tags".into(), join(doc.tags.iter().cloned().collect()).into());
    m.insert("timestamp".into(), indexed_at.to_rfc3339().into());
    m.insert("embedding_model".into(), doc.embedding_model.as_str().into());
    m
}

/// One condition on a metadata key
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(String, MetadataValue),
    In(String, Vec<MetadataValue>),
    /// The comma-joined string value contains `item` as one element
    ListContains(String, String),
}

impl Condition {
    fn matches(&self, metadata: &Metadata) -> bool {
        match self {
            Condition::Eq(key, value) => metadata.get(key) == Some(value),
            Condition::In(key, values) => metadata.get(key).is_some_and(|v| values.contains(v)),
            Condition::ListContains(key, item) => match metadata.get(key) {
                Some(MetadataValue::Str(list)) => list.split(',').any(|e| e == item),
                _ => false,
            },
        }
    }
}

/// Conjunction of metadata conditions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataFilter {
    pub conditions: Vec<Condition>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.conditions.push(Condition::Eq(key.into(), value.into()));
        self
    }

    pub fn any_of<I, V>(mut self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<MetadataValue>,
    {
        self.conditions
            .push(Condition::In(key.into(), values.into_iter().map(Into::into).collect()));
        self
    }

    pub fn list_contains(mut self, key: impl Into<String>, item: impl Into<String>) -> Self {
        self.conditions.push(Condition::ListContains(key.into(), item.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.conditions.iter().all(|c| c.matches(metadata))
    }
}

/// Storage for vector entries
///
/// Implementations must be thread-safe (Send + Sync). Connection-level
/// failures surface as `IndexUnavailable`; a missing entry is not an error.
pub trait VectorBackend: Send + Sync {
    /// Insert or replace the entry for `entry.chunk_id`.
    fn upsert(&self, entry: VectorEntry) -> RagdResult<()>;

    fn get(&self, chunk_id: &ChunkId) -> RagdResult<Option<VectorEntry>>;

    /// Returns whether an entry was removed.
    fn remove(&self, chunk_id: &ChunkId) -> RagdResult<bool>;

    /// Up to `k` nearest entries matching `filter`, as (chunk, cosine distance).
    fn query(&self, vector: &[f32], k: usize, filter: &MetadataFilter) -> RagdResult<Vec<(ChunkId, f32)>>;

    fn len(&self) -> RagdResult<usize>;

    fn is_empty(&self) -> RagdResult<bool> {
        Ok(self.len()? == 0)
    }
}

/// A ranked search result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub chunk_id: ChunkId,
    /// Similarity in [0.0, 1.0]
    pub score: f32,
}

/// Cosine similarity; 0.0 for zero or mismatched vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

pub fn similarity_from_distance(distance: f32) -> f32 {
    1.0 - distance
}

/// Order backend results nearest first, ties broken by chunk ID, and keep `k`.
///
/// Distances are clamped to `[0, 1]` first, so everything at or beyond
/// orthogonal ranks as one tie.
pub(crate) fn rank_by_distance(mut scored: Vec<(ChunkId, f32)>, k: usize) -> Vec<(ChunkId, f32)> {
    for entry in &mut scored {
        entry.1 = entry.1.clamp(0.0, 1.0);
    }
    scored.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
    scored.truncate(k);
    scored
}

/// Adapter over a `VectorBackend` that knows each model's dimensionality
pub struct VectorIndex {
    backend: Arc<dyn VectorBackend>,
    dimensions: BTreeMap<String, usize>,
}

impl VectorIndex {
    pub fn new(backend: Arc<dyn VectorBackend>) -> Self {
        Self {
            backend,
            dimensions: BTreeMap::new(),
        }
    }

    pub fn from_config(backend: Arc<dyn VectorBackend>, config: &Config) -> Self {
        Self {
            backend,
            dimensions: config.embedding.models.clone(),
        }
    }

    /// Register the vector size a model produces.
    pub fn with_model(mut self, model: impl Into<String>, dimensions: usize) -> Self {
        self.dimensions.insert(model.into(), dimensions);
        self
    }

    pub fn dimensions_for(&self, model: &str) -> RagdResult<usize> {
        self.dimensions.get(model).copied().ok_or_else(|| {
            RagdError::InvalidArgument(format!("no dimensionality configured for model '{}'", model))
        })
    }

    fn check_dimensions(&self, model: &str, actual: usize) -> RagdResult<()> {
        let expected = self.dimensions_for(model)?;
        if actual != expected {
            return Err(RagdError::DimensionMismatch {
                model: model.to_string(),
                expected,
                actual,
            });
        }
        Ok(())
    }

    /// Write the vector entry for a chunk under its document's model.
    pub fn index_chunk(
        &self,
        chunk: &Chunk,
        doc: &Document,
        embedding: Vec<f32>,
        indexed_at: DateTime<Utc>,
    ) -> RagdResult<()> {
        if chunk.doc_id != doc.doc_id {
            return Err(RagdError::InvalidArgument(format!(
                "chunk {} does not belong to document {}",
                chunk.chunk_id, doc.doc_id
            )));
        }
        self.check_dimensions(&doc.embedding_model, embedding.len())?;
        self.backend.upsert(VectorEntry {
            chunk_id: chunk.chunk_id.clone(),
            vector: embedding,
            metadata: flatten_metadata(chunk, doc, indexed_at),
        })?;
        debug!(chunk_id = %chunk.chunk_id, model = %doc.embedding_model, "indexed chunk");
        Ok(())
    }

    /// Top `top_k` entries embedded with `model`, most similar first.
    ///
    /// Equal scores are ordered by chunk ID so repeated queries return the
    /// same sequence.
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
        self.check_dimensions(model, query.len())?;

        let mut filter = filter.clone();
        filter.conditions.push(Condition::Eq("embedding_model".into(), model.into()));

        let mut hits: Vec<SearchHit> = self
            .backend
            .query(query, top_k, &filter)?
            .into_iter()
            .map(|(chunk_id, distance)| SearchHit {
                chunk_id,
                score: similarity_from_distance(distance).clamp(0.0, 1.0),
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.chunk_id.cmp(&b.chunk_id)));
        Ok(hits)
    }

    pub fn get_entry(&self, chunk_id: &ChunkId) -> RagdResult<Option<VectorEntry>> {
        self.backend.get(chunk_id)
    }

    /// Put a previously read entry back unchanged.
    pub fn restore_entry(&self, entry: VectorEntry) -> RagdResult<()> {
        self.backend.upsert(entry)
    }

    pub fn remove_chunk(&self, chunk_id: &ChunkId) -> RagdResult<bool> {
        self.backend.remove(chunk_id)
    }

    pub fn len(&self) -> RagdResult<usize> {
        self.backend.len()
    }

    pub fn is_empty(&self) -> RagdResult<bool> {
        self.backend.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ChunkDraft;

    const MODEL: &str = "test-model";

    fn sample() -> (Document, Chunk) {
        let doc = Document::from_text("papers/a.pdf", "abcdef", MODEL)
            .with_title("A Paper")
            .with_creator("Ada Lovelace")
            .with_tag("finance")
            .with_tag("q3-2024");
        let draft = ChunkDraft::new(0, 0, "abcdef").with_pages([1, 2]).with_section("Intro");
        let chunk = Chunk::from_draft(&doc.doc_id, &draft, 1);
        (doc, chunk)
    }

    fn index() -> VectorIndex {
        VectorIndex::new(Arc::new(InMemoryVectorBackend::new())).with_model(MODEL, 3)
    }

    #[test]
    fn flat_metadata_has_only_scalars() {
        let (doc, chunk) = sample();
        let m = flatten_metadata(&chunk, &doc, Utc::now());
        assert_eq!(m["pages"], MetadataValue::Str("1,2".into()));
        assert_eq!(m["page"], MetadataValue::Int(1));
        assert_eq!(m["tags"], MetadataValue::Str("finance,q3-2024".into()));
        assert_eq!(m["author"], MetadataValue::Str("Ada Lovelace".into()));
        assert_eq!(m["date"], MetadataValue::Null);
        assert_eq!(m.len(), 15);
    }

    #[test]
    fn filter_conditions() {
        let (doc, chunk) = sample();
        let m = flatten_metadata(&chunk, &doc, Utc::now());
        assert!(MetadataFilter::new().list_contains("tags", "finance").matches(&m));
        assert!(!MetadataFilter::new().list_contains("tags", "fin").matches(&m));
        assert!(MetadataFilter::new().any_of("page", [1i64, 5]).matches(&m));
        assert!(!MetadataFilter::new().eq("section", "Methods").matches(&m));
        assert!(MetadataFilter::new().matches(&m));
    }

    #[test]
    fn index_rejects_wrong_dimensions() {
        let (doc, chunk) = sample();
        let err = index().index_chunk(&chunk, &doc, vec![1.0; 4], Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            RagdError::DimensionMismatch { expected: 3, actual: 4, .. }
        ));
    }

    #[test]
    fn unknown_model_is_invalid_argument() {
        let (doc, chunk) = sample();
        let index = VectorIndex::new(Arc::new(InMemoryVectorBackend::new()));
        assert!(matches!(
            index.index_chunk(&chunk, &doc, vec![1.0; 3], Utc::now()).unwrap_err(),
            RagdError::InvalidArgument(_)
        ));
    }

    #[test]
    fn search_validates_arguments() {
        let index = index();
        let filter = MetadataFilter::new();
        assert!(matches!(
            index.search(&[1.0, 0.0, 0.0], MODEL, 0, &filter).unwrap_err(),
            RagdError::InvalidArgument(_)
        ));
        assert!(matches!(
            index.search(&[1.0, 0.0], MODEL, 5, &filter).unwrap_err(),
            RagdError::DimensionMismatch { .. }
        ));
    }

    #[test]
    fn search_orders_by_score_then_chunk_id() {
        let index = index();
        let doc = Document::from_text("a.txt", "aaaaaa", MODEL);
        for (seq, v) in [(2u32, [1.0, 0.0, 0.0]), (0, [1.0, 0.0, 0.0]), (1, [0.0, 1.0, 0.0])] {
            let draft = ChunkDraft::new(seq, seq as u64 * 2, "aa");
            let chunk = Chunk::from_draft(&doc.doc_id, &draft, 3);
            index.index_chunk(&chunk, &doc, v.to_vec(), Utc::now()).unwrap();
        }

        let hits = index.search(&[1.0, 0.0, 0.0], MODEL, 3, &MetadataFilter::new()).unwrap();
        let seqs: Vec<u32> = hits.iter().map(|h| h.chunk_id.sequence_num()).collect();
        assert_eq!(seqs, vec![0, 2, 1]);
        assert!((hits[0].score - 1.0).abs() < 1e-6);
        assert!(hits.iter().all(|h| (0.0..=1.0).contains(&h.score)));

        let again = index.search(&[1.0, 0.0, 0.0], MODEL, 3, &MetadataFilter::new()).unwrap();
        assert_eq!(hits, again);
    }

    #[test]
    fn opposite_vectors_clamp_to_zero() {
        let index = index();
        let (doc, chunk) = sample();
        index.index_chunk(&chunk, &doc, vec![-1.0, 0.0, 0.0], Utc::now()).unwrap();
        let hits = index.search(&[1.0, 0.0, 0.0], MODEL, 1, &MetadataFilter::new()).unwrap();
        assert_eq!(hits[0].score, 0.0);
    }

    #[test]
    fn clamped_scores_tie_by_chunk_id() {
        let index = index();
        let doc = Document::from_text("a.txt", "aaaa", MODEL);
        // Chunk 0 points almost straight away from the query, chunk 1 only slightly.
        for (seq, v) in [(0u32, [-1.0, 0.2, 0.0]), (1, [-0.1, 1.0, 0.0])] {
            let draft = ChunkDraft::new(seq, seq as u64 * 2, "aa");
            let chunk = Chunk::from_draft(&doc.doc_id, &draft, 2);
            index.index_chunk(&chunk, &doc, v.to_vec(), Utc::now()).unwrap();
        }

        let query = [1.0, 0.0, 0.0];
        let hits = index.search(&query, MODEL, 2, &MetadataFilter::new()).unwrap();
        let ranked: Vec<(u32, f32)> = hits.iter().map(|h| (h.chunk_id.sequence_num(), h.score)).collect();
        assert_eq!(ranked, vec![(0, 0.0), (1, 0.0)]);

        let top = index.search(&query, MODEL, 1, &MetadataFilter::new()).unwrap();
        assert_eq!(top[0].chunk_id.sequence_num(), 0);
    }

    #[test]
    fn similarity_is_one_minus_distance() {
        assert_eq!(similarity_from_distance(0.25), 0.75);
        assert!((cosine_distance(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 0.0]), 0.0);
    }
}
