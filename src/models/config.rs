use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::search::OutputFormat;

pub const DEFAULT_QDRANT_URL: &str = "http://localhost:6334";
pub const DEFAULT_COLLECTION: &str = "documents";
pub const DEFAULT_EMBEDDING_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";
pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 384;
pub const DEFAULT_MODEL_BATCH_SIZE: u32 = 8;
pub const DEFAULT_STORE_BATCH_SIZE: u32 = 100;
pub const DEFAULT_SEARCH_LIMIT: u32 = 5;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_METRICS_RETENTION_DAYS: u32 = 7;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub vector_store: VectorStoreConfig,

    #[serde(default)]
    pub ingest: IngestConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub daemon: DaemonConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("docdex").join("config.toml"))
    }

    pub fn load() -> Result<Self, crate::error::ConfigError> {
        if let Some(path) = Self::config_path()
            && path.exists()
        {
            let content = std::fs::read_to_string(&path)?;
            let config: Config = toml::from_str(&content)?;
            return Ok(config);
        }
        Ok(Self::default())
    }

    pub fn save(&self) -> Result<(), crate::error::ConfigError> {
        let path = Self::config_path().ok_or_else(|| {
            crate::error::ConfigError::Path("could not determine config directory".to_string())
        })?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    pub fn data_dir() -> Option<PathBuf> {
        dirs::data_dir().map(|p| p.join("docdex"))
    }

    pub fn models_dir() -> Option<PathBuf> {
        Self::data_dir().map(|p| p.join("models"))
    }

    pub fn metrics_db_path() -> Option<PathBuf> {
        Self::data_dir().map(|p| p.join("metrics.db"))
    }

    pub fn socket_path(&self) -> PathBuf {
        runtime_dir().join("docdex.sock")
    }

    pub fn pid_path(&self) -> PathBuf {
        runtime_dir().join("docdex.pid")
    }
}

fn runtime_dir() -> PathBuf {
    dirs::runtime_dir().unwrap_or_else(std::env::temp_dir)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_model_id")]
    pub model_id: String,

    /// Explicit directory holding model.onnx + tokenizer.json. When unset the
    /// model is looked up under the data dir by its id.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub model_path: Option<PathBuf>,

    #[serde(default = "default_dimension")]
    pub dimension: u32,

    #[serde(default = "default_model_batch_size")]
    pub batch_size: u32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_model_id() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_dimension() -> u32 {
    DEFAULT_EMBEDDING_DIMENSION
}

fn default_model_batch_size() -> u32 {
    DEFAULT_MODEL_BATCH_SIZE
}

fn default_max_tokens() -> u32 {
    256
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_id: default_model_id(),
            model_path: None,
            dimension: default_dimension(),
            batch_size: default_model_batch_size(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Vector store backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorDriver {
    #[default]
    Qdrant,
    PostgreSQL,
}

impl std::str::FromStr for VectorDriver {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "qdrant" => Ok(VectorDriver::Qdrant),
            "postgresql" | "postgres" | "pgvector" => Ok(VectorDriver::PostgreSQL),
            _ => Err(format!("unknown vector driver: {}", s)),
        }
    }
}

impl std::fmt::Display for VectorDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VectorDriver::Qdrant => write!(f, "qdrant"),
            VectorDriver::PostgreSQL => write!(f, "postgresql"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    #[serde(default)]
    pub driver: VectorDriver,

    #[serde(default = "default_store_url")]
    pub url: String,

    #[serde(default = "default_collection")]
    pub collection: String,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub api_key: Option<String>,

    #[serde(default = "default_pool_max")]
    pub pool_max: u32,

    #[serde(default = "default_pool_acquire_timeout")]
    pub pool_acquire_timeout: u32,
}

fn default_store_url() -> String {
    // DOCDEX_STORE_URL (typically via .env) wins over the compiled default.
    std::env::var("DOCDEX_STORE_URL").unwrap_or_else(|_| DEFAULT_QDRANT_URL.to_string())
}

fn default_collection() -> String {
    DEFAULT_COLLECTION.to_string()
}

fn default_pool_max() -> u32 {
    5
}

fn default_pool_acquire_timeout() -> u32 {
    30
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            driver: VectorDriver::default(),
            url: default_store_url(),
            collection: default_collection(),
            api_key: None,
            pool_max: default_pool_max(),
            pool_acquire_timeout: default_pool_acquire_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Maximum records per store write. Larger requests are split into
    /// consecutive batches of at most this size.
    #[serde(default = "default_store_batch_size")]
    pub batch_size: u32,
}

fn default_store_batch_size() -> u32 {
    DEFAULT_STORE_BATCH_SIZE
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: default_store_batch_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_limit")]
    pub default_limit: u32,

    #[serde(default)]
    pub default_format: OutputFormat,
}

fn default_limit() -> u32 {
    DEFAULT_SEARCH_LIMIT
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            default_format: OutputFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    #[serde(default = "default_auto_start")]
    pub auto_start: bool,
}

fn default_idle_timeout() -> u64 {
    DEFAULT_IDLE_TIMEOUT_SECS
}

fn default_auto_start() -> bool {
    true
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout(),
            auto_start: default_auto_start(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,

    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_retention_days() -> u32 {
    DEFAULT_METRICS_RETENTION_DAYS
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            retention_days: default_retention_days(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.vector_store.collection, DEFAULT_COLLECTION);
        assert_eq!(config.embedding.model_id, DEFAULT_EMBEDDING_MODEL);
        assert_eq!(config.embedding.dimension, 384);
    }

    #[test]
    fn test_batch_defaults() {
        let config = Config::default();
        assert_eq!(config.embedding.batch_size, 8);
        assert_eq!(config.ingest.batch_size, 100);
        assert_eq!(config.search.default_limit, 5);
    }

    #[test]
    fn test_config_path() {
        let path = Config::config_path();
        assert!(path.is_some());
    }

    #[test]
    fn test_driver_parse() {
        assert_eq!("qdrant".parse::<VectorDriver>(), Ok(VectorDriver::Qdrant));
        assert_eq!(
            "postgres".parse::<VectorDriver>(),
            Ok(VectorDriver::PostgreSQL)
        );
        assert!("chroma".parse::<VectorDriver>().is_err());
    }

    #[test]
    fn test_socket_path_is_stable() {
        let config = Config::default();
        assert_eq!(config.socket_path(), config.socket_path());
        assert!(config.socket_path().to_string_lossy().ends_with("docdex.sock"));
    }
}
