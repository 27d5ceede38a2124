//! Embedding capability used by the vector store backends.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::EmbeddingError;

/// Text-to-vector capability. Implementations return one unit-normalized
/// vector per input text, in input order, with a fixed dimension for the
/// lifetime of the embedder. Embedding is all-or-nothing per call: a failure
/// carries no partial results.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Single-string convenience: normalizes to a one-element batch.
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let texts = [text.to_string()];
        let mut vectors = self.embed(&texts).await?;
        vectors.pop().ok_or_else(|| {
            EmbeddingError::Inference("empty embedding output for single text".to_string())
        })
    }

    /// Identifier of the underlying model, for status reporting.
    fn model_id(&self) -> &str;
}

/// Shared handle to the process-wide embedder.
pub type SharedEmbedder = Arc<dyn Embedder>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::vector_store::testing::StubEmbedder;

    #[tokio::test]
    async fn test_embed_one_normalizes_to_single_vector() {
        let embedder = StubEmbedder;
        let single = embedder.embed_one("cat").await.unwrap();
        let batched = embedder.embed(&["cat".to_string()]).await.unwrap();
        assert_eq!(single, batched[0]);
    }
}
