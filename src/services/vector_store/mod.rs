//! Vector store abstraction layer.
//!
//! Trait-based abstraction over the vector store backends (Qdrant,
//! PostgreSQL/pgvector). A backend is constructed bound to one collection and
//! one [`Embedder`]: it invokes the embedder itself on every write and every
//! query, so callers hand over raw text and never touch vectors. One
//! collection holds one embedding space; the dimension is pinned at collection
//! creation.

mod pgvector;
mod qdrant;

pub use pgvector::PgVectorBackend;
pub use qdrant::QdrantBackend;

use async_trait::async_trait;

use crate::error::VectorStoreError;
use crate::models::{DocumentRecord, VectorDriver, VectorStoreConfig};
use crate::services::embedding::SharedEmbedder;

/// Collection/table information.
#[derive(Debug, Clone)]
pub struct CollectionInfo {
    pub points_count: u64,
}

/// One nearest-neighbor hit: the stored record's id and text plus its cosine
/// distance from the query (lower = more similar).
#[derive(Debug, Clone)]
pub struct QueryMatch {
    pub id: String,
    pub document: String,
    pub distance: f32,
}

/// Abstract contract for vector store operations.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Check if the vector store is healthy and accessible.
    async fn health_check(&self) -> Result<bool, VectorStoreError>;

    /// Get information about the bound collection.
    /// Returns None if the collection doesn't exist yet.
    async fn collection_info(&self) -> Result<Option<CollectionInfo>, VectorStoreError>;

    /// Create the bound collection if it doesn't exist. Idempotent: repeated
    /// calls with an existing collection succeed without side effects.
    async fn ensure_collection(&self) -> Result<(), VectorStoreError>;

    /// Append records. The record contents are embedded with the bound
    /// embedder before persisting; ids, documents and timestamps are stored
    /// alongside the vectors.
    async fn add(&self, records: &[DocumentRecord]) -> Result<(), VectorStoreError>;

    /// Embed each query text and return, per text, its nearest stored
    /// records ordered by ascending distance, truncated to `limit`.
    async fn query(
        &self,
        texts: &[String],
        limit: u64,
    ) -> Result<Vec<Vec<QueryMatch>>, VectorStoreError>;

    /// Get the bound collection name.
    fn collection(&self) -> &str;
}

/// Create a vector store backend based on configuration, bound to the given
/// embedder and embedding dimension.
pub async fn create_backend(
    config: &VectorStoreConfig,
    embedder: SharedEmbedder,
    embedding_dim: u64,
) -> Result<Box<dyn VectorStore>, VectorStoreError> {
    match config.driver {
        VectorDriver::Qdrant => {
            let backend = QdrantBackend::new(config, embedder, embedding_dim)?;
            Ok(Box::new(backend))
        }
        VectorDriver::PostgreSQL => {
            let backend = PgVectorBackend::new(config, embedder, embedding_dim).await?;
            Ok(Box::new(backend))
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory store and deterministic embedder for pipeline tests.

    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::error::EmbeddingError;
    use crate::services::embedding::Embedder;

    /// Deterministic toy embedder: folds bytes into a fixed number of
    /// buckets, then L2-normalizes. Identical texts embed identically.
    pub struct StubEmbedder;

    pub const STUB_DIM: usize = 8;

    impl StubEmbedder {
        fn vector(text: &str) -> Vec<f32> {
            let mut v = vec![0.0f32; STUB_DIM];
            for (i, b) in text.bytes().enumerate() {
                v[i % STUB_DIM] += f32::from(b) / 255.0;
            }
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm > 0.0 {
                v.iter().map(|x| x / norm).collect()
            } else {
                v
            }
        }
    }

    #[async_trait]
    impl Embedder for StubEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(texts.iter().map(|t| Self::vector(t)).collect())
        }

        fn model_id(&self) -> &str {
            "stub"
        }
    }

    /// Embedder that always fails, for exercising the embedding error path.
    pub struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Err(EmbeddingError::Inference("model exploded".to_string()))
        }

        fn model_id(&self) -> &str {
            "failing"
        }
    }

    /// In-memory [`VectorStore`] that honors the embed-on-write/embed-on-query
    /// contract and counts calls, with an optional injected failure on the
    /// n-th add call (1-based).
    pub struct MemoryStore {
        embedder: SharedEmbedder,
        records: Mutex<Vec<(DocumentRecord, Vec<f32>)>>,
        pub ensure_calls: AtomicUsize,
        pub add_calls: AtomicUsize,
        pub add_batch_sizes: Mutex<Vec<usize>>,
        fail_on_add_call: Option<usize>,
    }

    impl MemoryStore {
        pub fn new(embedder: SharedEmbedder) -> Self {
            Self {
                embedder,
                records: Mutex::new(Vec::new()),
                ensure_calls: AtomicUsize::new(0),
                add_calls: AtomicUsize::new(0),
                add_batch_sizes: Mutex::new(Vec::new()),
                fail_on_add_call: None,
            }
        }

        pub fn failing_on_add_call(embedder: SharedEmbedder, call: usize) -> Self {
            Self {
                fail_on_add_call: Some(call),
                ..Self::new(embedder)
            }
        }

        pub fn stored_count(&self) -> usize {
            self.records.lock().unwrap().len()
        }

        pub fn stored_contents(&self) -> Vec<String> {
            self.records
                .lock()
                .unwrap()
                .iter()
                .map(|(r, _)| r.content.clone())
                .collect()
        }
    }

    fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        1.0 - dot
    }

    #[async_trait]
    impl VectorStore for MemoryStore {
        async fn health_check(&self) -> Result<bool, VectorStoreError> {
            Ok(true)
        }

        async fn collection_info(&self) -> Result<Option<CollectionInfo>, VectorStoreError> {
            Ok(Some(CollectionInfo {
                points_count: self.stored_count() as u64,
            }))
        }

        async fn ensure_collection(&self) -> Result<(), VectorStoreError> {
            self.ensure_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn add(&self, records: &[DocumentRecord]) -> Result<(), VectorStoreError> {
            let call = self.add_calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.add_batch_sizes.lock().unwrap().push(records.len());
            if self.fail_on_add_call == Some(call) {
                return Err(VectorStoreError::Add("injected failure".to_string()));
            }

            let texts: Vec<String> = records.iter().map(|r| r.content.clone()).collect();
            let vectors = self.embedder.embed(&texts).await?;
            let mut stored = self.records.lock().unwrap();
            for (record, vector) in records.iter().zip(vectors) {
                stored.push((record.clone(), vector));
            }
            Ok(())
        }

        async fn query(
            &self,
            texts: &[String],
            limit: u64,
        ) -> Result<Vec<Vec<QueryMatch>>, VectorStoreError> {
            let query_vectors = self.embedder.embed(texts).await?;
            let stored = self.records.lock().unwrap();

            let mut all = Vec::with_capacity(query_vectors.len());
            for qv in &query_vectors {
                let mut matches: Vec<QueryMatch> = stored
                    .iter()
                    .map(|(record, vector)| QueryMatch {
                        id: record.id.clone(),
                        document: record.content.clone(),
                        distance: cosine_distance(qv, vector),
                    })
                    .collect();
                matches.sort_by(|a, b| a.distance.total_cmp(&b.distance));
                matches.truncate(limit as usize);
                all.push(matches);
            }
            Ok(all)
        }

        fn collection(&self) -> &str {
            "documents"
        }
    }
}
