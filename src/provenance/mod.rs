//! Provenance tracking for derived metadata
//!
//! Every automatically derived fact (tags, summaries, extracted fields) is
//! appended to an append-only log with its source, confidence and creator.
//! Suggested tags stay out of filtering until promoted.

mod tracker;
mod types;

pub use tracker::{History, HistoryIter, ProvenanceTracker};
pub use types::{ProvenanceEntry, ProvenanceRecord, TAG_CONFIRMED_FIELD, TAG_FIELD};
