mod config;
mod document;
mod search;

pub use config::{
    Config, DEFAULT_COLLECTION, DEFAULT_EMBEDDING_DIMENSION, DEFAULT_EMBEDDING_MODEL,
    DEFAULT_IDLE_TIMEOUT_SECS, DEFAULT_METRICS_RETENTION_DAYS, DEFAULT_MODEL_BATCH_SIZE,
    DEFAULT_QDRANT_URL, DEFAULT_SEARCH_LIMIT, DEFAULT_STORE_BATCH_SIZE, DaemonConfig,
    EmbeddingConfig, IngestConfig, MetricsConfig, SearchConfig, VectorDriver, VectorStoreConfig,
};
pub use document::DocumentRecord;
pub use search::{OutputFormat, SearchHit, SearchResults};
