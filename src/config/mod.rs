#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

pub const DEFAULT_NAMESPACE: &str = "rag-docs";
pub const DEFAULT_EMBEDDING_MODEL: &str = "embedding-001";
pub const DEFAULT_EMBEDDING_BASE_URL: &str = "https://generativelanguage.googleapis.com";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub pinecone: PineconeConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PineconeConfig {
    /// Data-plane host of the index, e.g. `https://my-index-abc123.svc.pinecone.io`
    pub index_host: String,
    /// Falls back to the `PINECONE_API_KEY` environment variable when empty
    pub api_key: String,
    pub namespace: String,
}

impl Default for PineconeConfig {
    fn default() -> Self {
        Self {
            index_host: String::new(),
            api_key: String::new(),
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub base_url: String,
    /// Falls back to the `GOOGLE_API_KEY` environment variable when empty
    pub api_key: String,
    pub model: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_EMBEDDING_BASE_URL.to_string(),
            api_key: String::new(),
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
        }
    }
}

/// Configuration for document chunking
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Target size in bytes for each chunk produced by the recursive split
    pub chunk_size: usize,
    /// Trailing bytes of the previous chunk re-included at the head of the next
    pub chunk_overlap: usize,
    /// Absolute upper bound in bytes on any chunk sent for embedding
    pub max_embed_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            max_embed_size: 30000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Records per upsert request, kept small to respect provider rate limits
    pub upsert_batch_size: usize,
    pub top_k: usize,
    /// Delay between per-chunk embedding requests during ingest
    pub embed_delay_ms: u64,
    /// Delay between sequential upsert batches
    pub batch_delay_ms: u64,
    /// End-to-end deadline for the search phase of a query
    pub query_timeout_secs: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            upsert_batch_size: 25,
            top_k: 5,
            embed_delay_ms: 300,
            batch_delay_ms: 1000,
            query_timeout_secs: 25,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid namespace: cannot be empty")]
    InvalidNamespace,
    #[error("Invalid embedding model: cannot be empty")]
    InvalidModel,
    #[error("Invalid chunk size: {0} (must be between 100 and 100000)")]
    InvalidChunkSize(usize),
    #[error("Chunk overlap ({0}) must be smaller than chunk size ({1})")]
    OverlapTooLarge(usize, usize),
    #[error("Max embed size ({0}) must be at least the chunk size ({1})")]
    MaxEmbedSizeTooSmall(usize, usize),
    #[error("Invalid upsert batch size: {0} (must be between 1 and 100)")]
    InvalidBatchSize(usize),
    #[error("Invalid top_k: {0} (must be between 1 and 100)")]
    InvalidTopK(usize),
    #[error("Invalid query timeout: {0} (must be between 1 and 300 seconds)")]
    InvalidQueryTimeout(u64),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    /// Load configuration from `config.toml` in the given directory, falling
    /// back to defaults when the file does not exist. Empty API keys are
    /// filled from the environment.
    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        let mut config = if config_path.exists() {
            let content = fs::read_to_string(&config_path).with_context(|| {
                format!("Failed to read config file: {}", config_path.display())
            })?;
            toml::from_str::<Config>(&content).with_context(|| {
                format!("Failed to parse config file: {}", config_path.display())
            })?
        } else {
            Config::default()
        };

        config.base_dir = config_dir.as_ref().to_path_buf();
        config.apply_env_overrides();

        config
            .validate()
            .context("Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        fs::create_dir_all(&self.base_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                self.base_dir.display()
            )
        })?;

        let config_path = self.base_dir.join("config.toml");
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// Default configuration directory under the platform config dir
    #[inline]
    pub fn default_config_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join("ragpipe"))
            .ok_or(ConfigError::DirectoryError)
    }

    fn apply_env_overrides(&mut self) {
        if self.pinecone.api_key.is_empty() {
            if let Ok(key) = env::var("PINECONE_API_KEY") {
                self.pinecone.api_key = key;
            }
        }
        if self.embedding.api_key.is_empty() {
            if let Ok(key) = env::var("GOOGLE_API_KEY") {
                self.embedding.api_key = key;
            }
        }
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pinecone.validate()?;
        self.embedding.validate()?;
        self.chunking.validate()?;
        self.retrieval.validate()?;
        Ok(())
    }
}

impl Default for Config {
    #[inline]
    fn default() -> Self {
        Self {
            pinecone: PineconeConfig::default(),
            embedding: EmbeddingConfig::default(),
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            base_dir: PathBuf::new(),
        }
    }
}

impl PineconeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.index_host.is_empty() {
            Url::parse(&self.index_host)
                .map_err(|_| ConfigError::InvalidUrl(self.index_host.clone()))?;
        }
        if self.namespace.trim().is_empty() {
            return Err(ConfigError::InvalidNamespace);
        }
        Ok(())
    }

    pub fn index_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.index_host).map_err(|_| ConfigError::InvalidUrl(self.index_host.clone()))
    }
}

impl EmbeddingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        Url::parse(&self.base_url).map_err(|_| ConfigError::InvalidUrl(self.base_url.clone()))?;
        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel);
        }
        Ok(())
    }

    pub fn base_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.base_url).map_err(|_| ConfigError::InvalidUrl(self.base_url.clone()))
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(100..=100_000).contains(&self.chunk_size) {
            return Err(ConfigError::InvalidChunkSize(self.chunk_size));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ConfigError::OverlapTooLarge(
                self.chunk_overlap,
                self.chunk_size,
            ));
        }
        if self.max_embed_size < self.chunk_size {
            return Err(ConfigError::MaxEmbedSizeTooSmall(
                self.max_embed_size,
                self.chunk_size,
            ));
        }
        Ok(())
    }
}

impl RetrievalConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.upsert_batch_size) {
            return Err(ConfigError::InvalidBatchSize(self.upsert_batch_size));
        }
        if !(1..=100).contains(&self.top_k) {
            return Err(ConfigError::InvalidTopK(self.top_k));
        }
        if !(1..=300).contains(&self.query_timeout_secs) {
            return Err(ConfigError::InvalidQueryTimeout(self.query_timeout_secs));
        }
        Ok(())
    }
}
