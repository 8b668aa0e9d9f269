//! Document record: one ingested source file

use crate::error::{RagdError, RagdResult};
use crate::id::DocumentId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::path::Path;

/// Source format of a document
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum DocType {
    Pdf,
    Text,
    Markdown,
    Html,
    Epub,
    Docx,
    Other(String),
}

impl DocType {
    /// Guess the type from a file extension; unknown extensions become `Other`.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let ext = path
            .as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "pdf" => DocType::Pdf,
            "txt" | "text" => DocType::Text,
            "md" | "markdown" => DocType::Markdown,
            "html" | "htm" => DocType::Html,
            "epub" => DocType::Epub,
            "docx" => DocType::Docx,
            "" => DocType::Text,
            other => DocType::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            DocType::Pdf => "pdf",
            DocType::Text => "text",
            DocType::Markdown => "markdown",
            DocType::Html => "html",
            DocType::Epub => "epub",
            DocType::Docx => "docx",
            DocType::Other(s) => s,
        }
    }
}

impl From<String> for DocType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "pdf" => DocType::Pdf,
            "text" => DocType::Text,
            "markdown" => DocType::Markdown,
            "html" => DocType::Html,
            "epub" => DocType::Epub,
            "docx" => DocType::Docx,
            _ => DocType::Other(s),
        }
    }
}

impl From<DocType> for String {
    fn from(t: DocType) -> Self {
        t.as_str().to_string()
    }
}

impl std::fmt::Display for DocType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An ingested source document with Dublin-Core-derived metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub doc_id: DocumentId,
    pub source_path: String,
    /// SHA-256 hex of the source bytes; unique across the store
    pub source_hash: String,
    pub title: Option<String>,
    /// Ordered author list; the first entry is the citation author
    pub creators: Vec<String>,
    pub subjects: BTreeSet<String>,
    pub description: Option<String>,
    pub date_created: Option<DateTime<Utc>>,
    pub doc_type: DocType,
    /// ISO 639-1 code
    pub language: String,
    pub chunk_count: u32,
    pub total_chars: u64,
    /// Model (and version) the document's chunks are embedded with
    pub embedding_model: String,
    pub ingestion_date: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    /// Confirmed tag names
    pub tags: BTreeSet<String>,
    pub project: Option<String>,
}

impl Document {
    /// Create a document record whose ID is derived from `source_hash`.
    pub fn new(
        source_path: impl Into<String>,
        source_hash: impl Into<String>,
        total_chars: u64,
        embedding_model: impl Into<String>,
    ) -> Self {
        let source_path = source_path.into();
        let source_hash = source_hash.into();
        let now = Utc::now();
        Self {
            doc_id: DocumentId::for_content(&source_hash),
            doc_type: DocType::from_path(&source_path),
            source_path,
            source_hash,
            title: None,
            creators: Vec::new(),
            subjects: BTreeSet::new(),
            description: None,
            date_created: None,
            language: "en".to_string(),
            chunk_count: 0,
            total_chars,
            embedding_model: embedding_model.into(),
            ingestion_date: now,
            last_modified: now,
            tags: BTreeSet::new(),
            project: None,
        }
    }

    /// Create a document record for extracted text, hashing and measuring it.
    pub fn from_text(
        source_path: impl Into<String>,
        text: &str,
        embedding_model: impl Into<String>,
    ) -> Self {
        Self::new(
            source_path,
            Self::hash_content(text.as_bytes()),
            text.chars().count() as u64,
            embedding_model,
        )
    }

    /// SHA-256 hex digest used as `source_hash`.
    pub fn hash_content(bytes: &[u8]) -> String {
        hex::encode(Sha256::digest(bytes))
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_creator(mut self, creator: impl Into<String>) -> Self {
        self.creators.push(creator.into());
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subjects.insert(subject.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_date_created(mut self, date: DateTime<Utc>) -> Self {
        self.date_created = Some(date);
        self
    }

    pub fn with_doc_type(mut self, doc_type: DocType) -> Self {
        self.doc_type = doc_type;
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    /// First creator, used as the citation author.
    pub fn author(&self) -> Option<&str> {
        self.creators.first().map(String::as_str)
    }

    /// Check field-level invariants before the record is written.
    pub fn validate(&self) -> RagdResult<()> {
        if self.source_hash.trim().is_empty() {
            return Err(RagdError::InvalidArgument("source_hash is empty".into()));
        }
        if self.source_path.trim().is_empty() {
            return Err(RagdError::InvalidArgument("source_path is empty".into()));
        }
        if self.embedding_model.trim().is_empty() {
            return Err(RagdError::InvalidArgument("embedding_model is empty".into()));
        }
        let lang = self.language.as_bytes();
        if lang.len() != 2 || !lang.iter().all(u8::is_ascii_lowercase) {
            return Err(RagdError::InvalidArgument(format!(
                "language must be an ISO 639-1 code, got '{}'",
                self.language
            )));
        }
        Ok(())
    }
}
