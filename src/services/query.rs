//! Query pipeline: a query string in, ranked hits out.

use std::sync::Arc;

use crate::error::{QueryError, ValidationError};
use crate::models::{SearchHit, SearchResults};
use crate::services::collection::CollectionManager;

/// Drives a single similarity search: validates the query, embeds it through
/// the store's bound embedder, and shapes the nearest-neighbor matches into
/// ranked hits (ascending score, lower = more similar).
pub struct QueryPipeline {
    collections: Arc<CollectionManager>,
    limit: u64,
}

impl QueryPipeline {
    pub fn new(collections: Arc<CollectionManager>, limit: u64) -> Self {
        Self {
            collections,
            limit: limit.max(1),
        }
    }

    /// Run one search. A missing or blank query is rejected before any store
    /// interaction. Fewer indexed documents than the limit yields that many
    /// hits; an empty collection yields an empty result set, not an error.
    pub async fn run(&self, query: Option<&str>) -> Result<SearchResults, QueryError> {
        let query = query
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or(ValidationError::MissingQuery)?;

        let collection = self.collections.get_or_create().await?;

        let texts = [query.to_string()];
        let matches = collection.query(&texts, self.limit).await?;

        let results = matches
            .into_iter()
            .next()
            .unwrap_or_default()
            .into_iter()
            .map(|m| SearchHit {
                id: m.id,
                document: m.document,
                score: m.distance,
            })
            .collect();

        Ok(SearchResults::new(query.to_string(), results))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::collection::CollectionManager;
    use crate::services::ingest::IngestionPipeline;
    use crate::services::vector_store::testing::{MemoryStore, StubEmbedder};
    use std::sync::atomic::Ordering;

    fn pipelines_over(store: Arc<MemoryStore>) -> (IngestionPipeline, QueryPipeline) {
        let collections = Arc::new(CollectionManager::new(store));
        (
            IngestionPipeline::new(collections.clone(), 100),
            QueryPipeline::new(collections, 5),
        )
    }

    #[tokio::test]
    async fn test_missing_query_is_rejected_before_store_interaction() {
        let store = Arc::new(MemoryStore::new(Arc::new(StubEmbedder)));
        let (_, query) = pipelines_over(store.clone());

        for q in [None, Some(""), Some("   ")] {
            let result = query.run(q).await;
            assert!(matches!(
                result,
                Err(QueryError::Validation(ValidationError::MissingQuery))
            ));
        }
        assert_eq!(store.ensure_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_collection_yields_empty_results() {
        let store = Arc::new(MemoryStore::new(Arc::new(StubEmbedder)));
        let (_, query) = pipelines_over(store);

        let results = query.run(Some("anything")).await.unwrap();

        assert_eq!(results.query, "anything");
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_fewer_documents_than_limit_returns_what_exists() {
        let store = Arc::new(MemoryStore::new(Arc::new(StubEmbedder)));
        let (ingest, query) = pipelines_over(store);

        ingest
            .ingest(vec!["a".to_string(), "b".to_string(), "c".to_string()])
            .await
            .unwrap();

        let results = query.run(Some("a")).await.unwrap();
        assert_eq!(results.len(), 3);
    }

    #[tokio::test]
    async fn test_exact_match_ranks_first_with_ascending_scores() {
        let store = Arc::new(MemoryStore::new(Arc::new(StubEmbedder)));
        let (ingest, query) = pipelines_over(store);

        ingest
            .ingest(vec!["cat".to_string(), "dog".to_string()])
            .await
            .unwrap();

        let results = query.run(Some("cat")).await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results.results[0].document, "cat");
        assert!(results.results[0].score <= results.results[1].score);
        // Identical text embeds identically: distance ~0 for the exact match.
        assert!(results.results[0].score.abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_query_is_trimmed() {
        let store = Arc::new(MemoryStore::new(Arc::new(StubEmbedder)));
        let (ingest, query) = pipelines_over(store);

        ingest.ingest(vec!["cat".to_string()]).await.unwrap();

        let results = query.run(Some("  cat  ")).await.unwrap();
        assert_eq!(results.query, "cat");
        assert_eq!(results.results[0].document, "cat");
    }
}
