//! Ingestion pipeline: validated documents in, persisted records out.

use std::sync::Arc;

use serde_json::Value;

use crate::error::{IngestError, ValidationError};
use crate::models::DocumentRecord;
use crate::services::collection::CollectionManager;

/// Validate the raw `documents` field of an add request.
///
/// Accepts only a JSON array of strings. Runs before any store or model
/// interaction, so a malformed request has no side effects.
pub fn parse_documents(value: &Value) -> Result<Vec<String>, ValidationError> {
    let items = value
        .as_array()
        .ok_or(ValidationError::DocumentsNotArray)?;

    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            item.as_str()
                .map(str::to_string)
                .ok_or(ValidationError::DocumentNotString(i))
        })
        .collect()
}

/// Drives document ingestion: batching, id/timestamp assignment and store
/// writes.
///
/// Batches within one request are written sequentially in input order. A
/// failing batch aborts the remaining batches of the request; batches already
/// written stay persisted (at-least-once, no rollback).
pub struct IngestionPipeline {
    collections: Arc<CollectionManager>,
    batch_size: usize,
}

impl IngestionPipeline {
    pub fn new(collections: Arc<CollectionManager>, batch_size: usize) -> Self {
        Self {
            collections,
            batch_size: batch_size.max(1),
        }
    }

    /// Validate the raw request payload, then ingest.
    pub async fn run(&self, documents: &Value) -> Result<u64, IngestError> {
        let documents = parse_documents(documents)?;
        self.ingest(documents).await
    }

    /// Ingest already-validated documents, returning the number of records
    /// written. An empty input succeeds with zero added and touches neither
    /// the store nor the model.
    pub async fn ingest(&self, documents: Vec<String>) -> Result<u64, IngestError> {
        if documents.is_empty() {
            return Ok(0);
        }

        let collection = self.collections.get_or_create().await?;

        let mut total_added: u64 = 0;
        for batch in documents.chunks(self.batch_size) {
            let records = DocumentRecord::from_documents(batch);
            collection.add(&records).await?;
            total_added += records.len() as u64;
        }

        Ok(total_added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::vector_store::testing::{MemoryStore, StubEmbedder};
    use serde_json::json;
    use std::sync::atomic::Ordering;

    fn pipeline_over(store: Arc<MemoryStore>) -> IngestionPipeline {
        IngestionPipeline::new(Arc::new(CollectionManager::new(store)), 100)
    }

    #[test]
    fn test_parse_documents_accepts_string_array() {
        let docs = parse_documents(&json!(["cat", "dog"])).unwrap();
        assert_eq!(docs, vec!["cat".to_string(), "dog".to_string()]);
    }

    #[test]
    fn test_parse_documents_accepts_empty_array() {
        assert!(parse_documents(&json!([])).unwrap().is_empty());
    }

    #[test]
    fn test_parse_documents_rejects_bare_string() {
        assert_eq!(
            parse_documents(&json!("not-an-array")),
            Err(ValidationError::DocumentsNotArray)
        );
    }

    #[test]
    fn test_parse_documents_rejects_non_string_element() {
        assert_eq!(
            parse_documents(&json!(["ok", 42])),
            Err(ValidationError::DocumentNotString(1))
        );
    }

    #[tokio::test]
    async fn test_empty_input_adds_nothing_and_makes_no_store_calls() {
        let store = Arc::new(MemoryStore::new(Arc::new(StubEmbedder)));
        let pipeline = pipeline_over(store.clone());

        let added = pipeline.ingest(Vec::new()).await.unwrap();

        assert_eq!(added, 0);
        assert_eq!(store.ensure_calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.add_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_ingest_partitions_into_bounded_batches() {
        let store = Arc::new(MemoryStore::new(Arc::new(StubEmbedder)));
        let pipeline = pipeline_over(store.clone());

        let docs: Vec<String> = (0..250).map(|i| format!("doc {}", i)).collect();
        let added = pipeline.ingest(docs).await.unwrap();

        assert_eq!(added, 250);
        assert_eq!(store.add_calls.load(Ordering::SeqCst), 3);
        assert_eq!(*store.add_batch_sizes.lock().unwrap(), vec![100, 100, 50]);
        assert_eq!(store.stored_count(), 250);
    }

    #[tokio::test]
    async fn test_ingest_preserves_document_order() {
        let store = Arc::new(MemoryStore::new(Arc::new(StubEmbedder)));
        let pipeline = IngestionPipeline::new(
            Arc::new(CollectionManager::new(store.clone())),
            2,
        );

        let docs: Vec<String> = (0..5).map(|i| format!("doc {}", i)).collect();
        pipeline.ingest(docs.clone()).await.unwrap();

        assert_eq!(store.stored_contents(), docs);
    }

    #[tokio::test]
    async fn test_failing_batch_aborts_but_keeps_committed_batches() {
        let store = Arc::new(MemoryStore::failing_on_add_call(Arc::new(StubEmbedder), 2));
        let pipeline = pipeline_over(store.clone());

        let docs: Vec<String> = (0..150).map(|i| format!("doc {}", i)).collect();
        let result = pipeline.ingest(docs).await;

        assert!(matches!(result, Err(IngestError::Store(_))));
        // The first batch of 100 was committed before the failure and stays.
        assert_eq!(store.stored_count(), 100);
        assert_eq!(store.add_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_run_rejects_non_array_before_any_store_interaction() {
        let store = Arc::new(MemoryStore::new(Arc::new(StubEmbedder)));
        let pipeline = pipeline_over(store.clone());

        let result = pipeline.run(&json!("not-an-array")).await;

        assert!(matches!(
            result,
            Err(IngestError::Validation(ValidationError::DocumentsNotArray))
        ));
        assert_eq!(store.ensure_calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.add_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_run_counts_all_added_documents() {
        let store = Arc::new(MemoryStore::new(Arc::new(StubEmbedder)));
        let pipeline = pipeline_over(store.clone());

        let added = pipeline.run(&json!(["cat", "dog"])).await.unwrap();

        assert_eq!(added, 2);
        assert_eq!(store.stored_count(), 2);
    }
}
