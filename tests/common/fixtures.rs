//! Catalog, pipeline and chunk batch builders

use super::embedder::{HashEmbedder, DIMS, MODEL};
use ragd::index::VectorBackend;
use ragd::ingest::IngestOutcome;
use ragd::{
    Catalog, ChunkDraft, Config, Document, IngestPipeline, IngestRequest, OpenStore, SqliteStore,
    VectorIndex,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Route library logs to the test harness; `RUST_LOG=ragd=debug` to see them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn test_config() -> Config {
    Config::default().with_model(MODEL, DIMS)
}

/// Catalog over an in-memory record store and the given vector backend.
pub fn test_catalog(backend: Arc<dyn VectorBackend>) -> Arc<Catalog> {
    init_tracing();
    let config = test_config();
    let store = Arc::new(SqliteStore::open_in_memory().expect("open in-memory store"));
    let index = VectorIndex::from_config(backend, &config);
    Arc::new(Catalog::new(store, index, &config))
}

pub fn test_pipeline(catalog: &Arc<Catalog>, embedder: Arc<HashEmbedder>) -> IngestPipeline {
    IngestPipeline::new(Arc::clone(catalog), embedder, &test_config())
}

/// Distinct sentences, so every chunk has different content.
pub fn sample_text(sentences: usize) -> String {
    (0..sentences)
        .map(|i| format!("Sentence {} covers topic {}.", i, i % 5))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Like `sample_text`, but every sentence carries `seed`, so texts with
/// different seeds share no chunk content.
pub fn seeded_text(seed: &str, sentences: usize) -> String {
    (0..sentences)
        .map(|i| format!("{} sentence {} covers topic {}.", seed, i, i % 5))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Fixed-size windows with `overlap` characters shared between neighbours,
/// tiling the whole of `text`.
pub fn overlapping_drafts(text: &str, size: usize, overlap: usize) -> Vec<ChunkDraft> {
    assert!(overlap < size, "overlap must be smaller than the window");
    let chars: Vec<char> = text.chars().collect();
    let total = chars.len();
    let mut drafts = Vec::new();
    if total == 0 {
        return drafts;
    }

    let mut start = 0;
    let mut prev_overlap = 0;
    loop {
        let end = (start + size).min(total);
        let content: String = chars[start..end].iter().collect();
        let next_overlap = if end < total { overlap as u64 } else { 0 };
        drafts.push(
            ChunkDraft::new(drafts.len() as u32, start as u64, content)
                .with_overlap(prev_overlap, next_overlap),
        );
        if end == total {
            break;
        }
        prev_overlap = overlap as u64;
        start += size - overlap;
    }
    drafts
}

/// Ingest `text` under `path` with 40-character windows and 8 characters of overlap.
pub fn ingest_text(pipeline: &IngestPipeline, path: &str, text: &str) -> (Document, IngestOutcome) {
    let doc = Document::from_text(path, text, MODEL);
    let request = IngestRequest::new(doc.clone(), overlapping_drafts(text, 40, 8));
    let outcome = pipeline.ingest_one(request).expect("ingest document");
    (doc, outcome)
}
