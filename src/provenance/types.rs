//! Provenance log records

use crate::error::RagdResult;
use crate::model::{check_confidence, TagSource};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Field name under which tag applications are logged
pub const TAG_FIELD: &str = "tag";

/// Field name logged when a suggested tag is promoted
pub const TAG_CONFIRMED_FIELD: &str = "tag.confirmed";

/// A provenance fact waiting to be appended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceRecord {
    /// Document or chunk ID the fact is about
    pub entity_id: String,
    pub field: String,
    pub value: String,
    pub source: TagSource,
    pub confidence: Option<f64>,
    pub created_by: String,
}

impl ProvenanceRecord {
    pub fn new(
        entity_id: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<String>,
        source: TagSource,
        confidence: Option<f64>,
        created_by: impl Into<String>,
    ) -> RagdResult<Self> {
        check_confidence(source, confidence)?;
        Ok(Self {
            entity_id: entity_id.into(),
            field: field.into(),
            value: value.into(),
            source,
            confidence,
            created_by: created_by.into(),
        })
    }
}

/// An appended provenance entry; never updated or deleted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceEntry {
    /// Monotonic log position
    pub id: i64,
    pub entity_id: String,
    pub field: String,
    pub value: String,
    pub source: TagSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}
