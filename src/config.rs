//! TOML configuration
//!
//! ```toml
//! [storage]
//! db_path = "/var/lib/ragd/ragd.db"
//! vector_path = "/var/lib/ragd/vectors.db"
//!
//! [embedding.models]
//! "nomic-embed-text-v1.5" = 768
//!
//! [chunking]
//! min_chunk_chars = 200
//!
//! [ingest]
//! workers = 4
//! search_overfetch = 4
//! ```

use crate::error::{RagdError, RagdResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Vector index database; `vectors.db` beside `db_path` when unset
    #[serde(default)]
    pub vector_path: Option<PathBuf>,
}

impl StorageConfig {
    pub fn vector_path(&self) -> PathBuf {
        self.vector_path
            .clone()
            .unwrap_or_else(|| self.db_path.with_file_name("vectors.db"))
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            vector_path: None,
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ragd")
}

fn default_db_path() -> PathBuf {
    default_data_dir().join("ragd.db")
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Vector dimensionality per embedding model name
    #[serde(default)]
    pub models: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Minimum characters for every chunk except a document's last
    #[serde(default = "default_min_chunk_chars")]
    pub min_chunk_chars: u64,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            min_chunk_chars: default_min_chunk_chars(),
        }
    }
}

fn default_min_chunk_chars() -> u64 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Documents processed concurrently by batch ingestion
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Initial multiplier on `top_k` when searching past stale entries
    #[serde(default = "default_search_overfetch")]
    pub search_overfetch: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            search_overfetch: default_search_overfetch(),
        }
    }
}

fn default_workers() -> usize {
    4
}

fn default_search_overfetch() -> usize {
    2
}

impl Config {
    /// Register a model's vector size.
    pub fn with_model(mut self, model: impl Into<String>, dimensions: usize) -> Self {
        self.embedding.models.insert(model.into(), dimensions);
        self
    }

    pub fn validate(&self) -> RagdResult<()> {
        if let Some((model, _)) = self.embedding.models.iter().find(|(_, dims)| **dims == 0) {
            return Err(RagdError::Config(format!(
                "embedding.models.\"{}\" must be > 0",
                model
            )));
        }
        if self.ingest.workers == 0 {
            return Err(RagdError::Config("ingest.workers must be >= 1".into()));
        }
        if self.ingest.search_overfetch == 0 {
            return Err(RagdError::Config("ingest.search_overfetch must be >= 1".into()));
        }
        Ok(())
    }
}

pub fn parse_config(content: &str) -> RagdResult<Config> {
    let config: Config = toml::from_str(content)
        .map_err(|e| RagdError::Config(format!("failed to parse config: {}", e)))?;
    config.validate()?;
    Ok(config)
}

pub fn load_config(path: &Path) -> RagdResult<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        RagdError::Config(format!("failed to read config file {}: {}", path.display(), e))
    })?;
    parse_config(&content)
}
