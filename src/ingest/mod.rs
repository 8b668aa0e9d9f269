//! Ingestion of externally chunked documents

mod cancel;
mod embedder;
mod pipeline;

pub use cancel::CancellationToken;
pub use embedder::{Embedder, EmbeddingError};
pub use pipeline::{
    BatchReport, IndexReport, IngestFailure, IngestOutcome, IngestPipeline, IngestRequest,
    IngestStatus,
};
