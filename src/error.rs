//! Error types for the document indexing daemon.

use thiserror::Error;

/// Errors caused by malformed client input. Reported before any store or
/// model interaction takes place.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("documents must be an array")]
    DocumentsNotArray,

    #[error("documents[{0}] must be a string")]
    DocumentNotString(usize),

    #[error("query is required")]
    MissingQuery,
}

/// Errors related to the embedding model.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding model not found: {0}")]
    NotFound(String),

    #[error("failed to load embedding model: {0}")]
    Load(String),

    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    #[error("inference error: {0}")]
    Inference(String),
}

/// Errors related to vector store operations.
///
/// The store invokes the bound embedder on every write and query, so an
/// embedding failure inside a store call keeps its own variant instead of
/// being flattened into a generic store failure.
#[derive(Debug, Error)]
pub enum VectorStoreError {
    #[error("failed to connect to vector store: {0}")]
    Connection(String),

    #[error("collection error: {0}")]
    Collection(String),

    #[error("add error: {0}")]
    Add(String),

    #[error("query error: {0}")]
    Query(String),

    #[error("postgres error: {0}")]
    Postgres(String),

    #[error("pgvector extension error: {0}")]
    Extension(String),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
}

/// Errors surfaced by the ingestion pipeline.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] VectorStoreError),
}

/// Errors surfaced by the query pipeline.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] VectorStoreError),
}

/// Errors related to configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("path error: {0}")]
    Path(String),
}

/// Errors on the client side of the daemon protocol.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("daemon is not running")]
    NotRunning,

    #[error("failed to spawn daemon: {0}")]
    Spawn(String),

    #[error("timed out waiting for daemon")]
    Timeout,

    #[error("failed to connect to daemon: {0}")]
    ConnectionFailed(String),

    #[error("socket error: {0}")]
    Socket(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("{message}")]
    Remote {
        kind: crate::server::protocol::ErrorKind,
        message: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DaemonError {
    /// True when the daemon rejected the request as malformed client input.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            DaemonError::Remote {
                kind: crate::server::protocol::ErrorKind::Validation,
                ..
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::protocol::ErrorKind;

    #[test]
    fn test_validation_messages() {
        assert_eq!(
            ValidationError::DocumentsNotArray.to_string(),
            "documents must be an array"
        );
        assert_eq!(
            ValidationError::MissingQuery.to_string(),
            "query is required"
        );
        assert_eq!(
            ValidationError::DocumentNotString(3).to_string(),
            "documents[3] must be a string"
        );
    }

    #[test]
    fn test_embedding_error_stays_distinguishable_inside_store_error() {
        let err: VectorStoreError = EmbeddingError::Inference("shape mismatch".to_string()).into();
        assert!(matches!(err, VectorStoreError::Embedding(_)));
    }

    #[test]
    fn test_remote_validation_detection() {
        let err = DaemonError::Remote {
            kind: ErrorKind::Validation,
            message: "query is required".to_string(),
        };
        assert!(err.is_validation());

        let err = DaemonError::Remote {
            kind: ErrorKind::Store,
            message: "unreachable".to_string(),
        };
        assert!(!err.is_validation());
    }
}
