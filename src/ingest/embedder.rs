//! Embedding provider seam
//!
//! Model loading and inference live outside this crate. Production callers
//! wrap their provider in `Embedder`; tests use deterministic mocks.

use crate::error::RagdError;
use std::fmt;

/// Error type for embedding operations.
#[derive(Debug)]
pub enum EmbeddingError {
    /// The provider returned no vectors
    EmptyResult,
    /// The provider returned a different number of vectors than texts
    CountMismatch { expected: usize, actual: usize },
    /// Model loading or inference failed
    ModelError(String),
}

impl fmt::Display for EmbeddingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmbeddingError::EmptyResult => write!(f, "embedding returned no results"),
            EmbeddingError::CountMismatch { expected, actual } => {
                write!(f, "embedding returned {} vectors for {} texts", actual, expected)
            }
            EmbeddingError::ModelError(msg) => write!(f, "embedding model error: {}", msg),
        }
    }
}

impl std::error::Error for EmbeddingError {}

impl From<EmbeddingError> for RagdError {
    fn from(e: EmbeddingError) -> Self {
        RagdError::Embedding(e.to_string())
    }
}

/// Trait for embedding text into vectors.
pub trait Embedder: Send + Sync {
    /// Model name (and version) recorded on chunks embedded by this provider.
    fn model_name(&self) -> &str;

    /// Embed a batch of texts, returning one vector per text.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

/// Call `embed_batch` and hold the provider to one vector per text.
pub(crate) fn embed_exact(embedder: &dyn Embedder, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }
    let vectors = embedder.embed_batch(texts)?;
    if vectors.is_empty() {
        return Err(EmbeddingError::EmptyResult);
    }
    if vectors.len() != texts.len() {
        return Err(EmbeddingError::CountMismatch {
            expected: texts.len(),
            actual: vectors.len(),
        });
    }
    Ok(vectors)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Truncating;

    impl Embedder for Truncating {
        fn model_name(&self) -> &str {
            "truncating"
        }

        fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(texts.iter().skip(1).map(|_| vec![1.0]).collect())
        }
    }

    #[test]
    fn short_batches_are_rejected() {
        let err = embed_exact(&Truncating, &["a", "b"]).unwrap_err();
        assert!(matches!(err, EmbeddingError::CountMismatch { expected: 2, actual: 1 }));
        assert!(matches!(embed_exact(&Truncating, &["a"]), Err(EmbeddingError::EmptyResult)));
    }

    #[test]
    fn provider_errors_are_retryable() {
        let err: RagdError = EmbeddingError::ModelError("timeout".into()).into();
        assert!(err.is_retryable());
        assert_eq!(err.to_string(), "Embedding provider error: embedding model error: timeout");
    }

    #[test]
    fn empty_input_skips_provider() {
        assert!(embed_exact(&Truncating, &[]).unwrap().is_empty());
    }
}
