//! Deterministic embedder for tests
//!
//! Vectors are derived from a SHA-256 digest of the text, so identical
//! text always embeds identically and an exact-text query scores 1.0.

use ragd::{CancellationToken, Embedder, EmbeddingError};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub const MODEL: &str = "hash-embed-v1";
pub const DIMS: usize = 16;

pub struct HashEmbedder {
    model: String,
    dims: usize,
    calls: AtomicUsize,
    failing: AtomicBool,
    /// Cancelled on every call, to stop a batch from inside a worker
    cancel: Option<CancellationToken>,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl HashEmbedder {
    pub fn new() -> Self {
        Self::with_model(MODEL, DIMS)
    }

    pub fn with_model(model: impl Into<String>, dims: usize) -> Self {
        Self {
            model: model.into(),
            dims,
            calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
            cancel: None,
        }
    }

    pub fn cancelling(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The vector `embed_batch` produces for `text`.
    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let digest = Sha256::digest(format!("{}:{}", self.model, text).as_bytes());
        (0..self.dims)
            .map(|i| digest[i % digest.len()] as f32 / 255.0 - 0.5)
            .collect()
    }
}

impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(token) = &self.cancel {
            token.cancel();
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(EmbeddingError::ModelError("provider offline".into()));
        }
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }
}
