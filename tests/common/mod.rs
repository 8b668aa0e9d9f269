//! Shared fixtures for ragd integration tests
//!
//! Provides a deterministic embedder, a vector backend with injectable
//! outages, and builders for catalogs and overlapping chunk batches.

#![allow(dead_code)]

pub mod embedder;
pub mod fixtures;
pub mod flaky;

pub use embedder::{HashEmbedder, DIMS, MODEL};
pub use fixtures::{
    ingest_text, init_tracing, overlapping_drafts, sample_text, seeded_text, test_catalog, test_config,
    test_pipeline,
};
pub use flaky::FlakyBackend;
