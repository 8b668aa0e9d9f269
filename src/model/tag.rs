//! Provenance-tracked tags and boolean tag queries

use crate::error::{RagdError, RagdResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a tag (or any derived metadata fact) came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TagSource {
    Manual,
    AutoLlm,
    AutoKeybert,
    AutoNer,
    Imported,
}

impl TagSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TagSource::Manual => "manual",
            TagSource::AutoLlm => "auto-llm",
            TagSource::AutoKeybert => "auto-keybert",
            TagSource::AutoNer => "auto-ner",
            TagSource::Imported => "imported",
        }
    }

    pub fn is_automatic(&self) -> bool {
        !matches!(self, TagSource::Manual)
    }
}

impl std::str::FromStr for TagSource {
    type Err = RagdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(Self::Manual),
            "auto-llm" => Ok(Self::AutoLlm),
            "auto-keybert" => Ok(Self::AutoKeybert),
            "auto-ner" => Ok(Self::AutoNer),
            "imported" => Ok(Self::Imported),
            _ => Err(RagdError::InvalidArgument(format!("unknown tag source: {}", s))),
        }
    }
}

impl std::fmt::Display for TagSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Confidence must lie in [0, 1] and is mandatory for automatic sources.
pub(crate) fn check_confidence(source: TagSource, confidence: Option<f64>) -> RagdResult<()> {
    match confidence {
        Some(c) if !(0.0..=1.0).contains(&c) => Err(RagdError::InvalidArgument(format!(
            "confidence must be in [0.0, 1.0], got {}",
            c
        ))),
        None if source.is_automatic() => Err(RagdError::InvalidArgument(format!(
            "confidence is required for {} tags",
            source
        ))),
        _ => Ok(()),
    }
}

/// One applied tag with its audit metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagEntry {
    pub name: String,
    pub source: TagSource,
    pub confidence: Option<f64>,
    /// Only confirmed tags take part in filtering
    pub confirmed: bool,
    pub created_at: DateTime<Utc>,
    /// User id for manual tags, model or algorithm id otherwise
    pub created_by: String,
}

impl TagEntry {
    /// A user-applied tag; confirmed from the start.
    pub fn manual(name: impl Into<String>, created_by: impl Into<String>) -> RagdResult<Self> {
        Self::new(name, TagSource::Manual, None, created_by)
    }

    /// A tag from any source. Automatic tags begin unconfirmed.
    pub fn new(
        name: impl Into<String>,
        source: TagSource,
        confidence: Option<f64>,
        created_by: impl Into<String>,
    ) -> RagdResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(RagdError::InvalidArgument("tag name is empty".into()));
        }
        check_confidence(source, confidence)?;
        Ok(Self {
            name,
            source,
            confidence,
            confirmed: !source.is_automatic(),
            created_at: Utc::now(),
            created_by: created_by.into(),
        })
    }
}

/// Boolean tag filter: all three clauses must hold
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagQuery {
    /// Every listed tag must be present
    #[serde(default)]
    pub include_all: Vec<String>,
    /// At least one must be present; vacuously true when empty
    #[serde(default)]
    pub include_any: Vec<String>,
    /// None may be present
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl TagQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include_all.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn any<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include_any.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn exclude<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.include_all.is_empty() && self.include_any.is_empty() && self.exclude.is_empty()
    }

    /// Evaluate the query against a set of (confirmed) tag names.
    pub fn matches<'a, I>(&self, tag_names: I) -> bool
    where
        I: IntoIterator<Item = &'a String>,
    {
        let tags: Vec<&str> = tag_names.into_iter().map(String::as_str).collect();
        let present = |pattern: &str| tags.iter().any(|t| tag_matches(pattern, t));

        self.include_all.iter().all(|p| present(p.as_str()))
            && (self.include_any.is_empty() || self.include_any.iter().any(|p| present(p.as_str())))
            && !self.exclude.iter().any(|p| present(p.as_str()))
    }
}

/// Match one tag against a filter pattern.
///
/// `prefix/*` matches any tag that starts with `prefix/` and has a
/// non-empty remainder; other patterns match exactly.
pub fn tag_matches(pattern: &str, tag: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) if prefix.ends_with('/') => {
            tag.len() > prefix.len() && tag.starts_with(prefix)
        }
        _ => pattern == tag,
    }
}
