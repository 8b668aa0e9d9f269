//! Citation assembly from search hits

use crate::error::RagdResult;
use crate::id::ChunkId;
use crate::index::SearchHit;
use crate::model::{Chunk, Citation, Document};
use crate::store::RecordStore;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// How much chunk text a citation carries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExcerptPolicy {
    /// The full chunk content
    #[default]
    Verbatim,
    /// At most `max_chars` characters from the middle of the chunk
    Window { max_chars: usize },
}

impl ExcerptPolicy {
    pub fn excerpt(&self, content: &str) -> String {
        match *self {
            ExcerptPolicy::Verbatim => content.to_string(),
            ExcerptPolicy::Window { max_chars } => {
                let len = content.chars().count();
                if len <= max_chars {
                    return content.to_string();
                }
                let start = (len - max_chars) / 2;
                content.chars().skip(start).take(max_chars).collect()
            }
        }
    }
}

/// Why a hit could not be cited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftKind {
    /// The vector entry outlived its chunk record
    MissingChunk,
    /// The chunk exists but its document record does not
    MissingDocument,
}

/// A hit dropped from assembly because the two stores disagree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DriftWarning {
    pub chunk_id: ChunkId,
    pub kind: DriftKind,
}

/// Citations in hit order, plus the hits that had to be dropped
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CitationBatch {
    pub citations: Vec<Citation>,
    pub warnings: Vec<DriftWarning>,
}

pub struct CitationAssembler {
    store: Arc<dyn RecordStore>,
    policy: ExcerptPolicy,
}

impl CitationAssembler {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            policy: ExcerptPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: ExcerptPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Resolve each hit to its chunk and document, preserving input order.
    ///
    /// Missing records are reported as drift, not errors; any other store
    /// failure aborts assembly.
    pub fn assemble_citations(&self, hits: &[SearchHit]) -> RagdResult<CitationBatch> {
        let mut batch = CitationBatch::default();
        let mut documents: HashMap<String, Option<Document>> = HashMap::new();

        for hit in hits {
            let chunk = match self.store.get_chunk(&hit.chunk_id) {
                Ok(chunk) => chunk,
                Err(e) if e.is_not_found() => {
                    self.drift(&mut batch, hit, DriftKind::MissingChunk);
                    continue;
                }
                Err(e) => return Err(e),
            };

            let key = chunk.doc_id.as_str().to_string();
            if !documents.contains_key(&key) {
                let doc = match self.store.get_document(&chunk.doc_id) {
                    Ok(doc) => Some(doc),
                    Err(e) if e.is_not_found() => None,
                    Err(e) => return Err(e),
                };
                documents.insert(key.clone(), doc);
            }
            match documents.get(&key).and_then(Option::as_ref) {
                Some(doc) => batch.citations.push(self.cite(doc, &chunk, hit.score)),
                None => self.drift(&mut batch, hit, DriftKind::MissingDocument),
            }
        }
        Ok(batch)
    }

    fn cite(&self, doc: &Document, chunk: &Chunk, score: f32) -> Citation {
        Citation {
            doc_id: doc.doc_id.clone(),
            title: doc.title.clone(),
            author: doc.author().map(str::to_string),
            date: doc.date_created,
            source_path: doc.source_path.clone(),
            chunk_id: chunk.chunk_id.clone(),
            page_numbers: chunk.page_numbers.clone(),
            section_heading: chunk.section_heading.clone(),
            char_start: chunk.char_start,
            char_end: chunk.char_end,
            retrieval_score: score.clamp(0.0, 1.0),
            excerpt: self.policy.excerpt(&chunk.content),
        }
    }

    fn drift(&self, batch: &mut CitationBatch, hit: &SearchHit, kind: DriftKind) {
        warn!(chunk_id = %hit.chunk_id, ?kind, "search hit has no matching record");
        batch.warnings.push(DriftWarning {
            chunk_id: hit.chunk_id.clone(),
            kind,
        });
    }
}

/// Short form for logs and plain-text output: `Title, p. 3`.
pub fn format_reference(citation: &Citation) -> String {
    let title = citation.title.as_deref().unwrap_or(&citation.source_path);
    match citation.page_numbers.as_slice() {
        [] => title.to_string(),
        [page] => format!("{}, p. {}", title, page),
        [first, .., last] => format!("{}, pp. {}-{}", title, first, last),
    }
}
