//! Collection lifecycle management.

use std::sync::Arc;

use crate::error::VectorStoreError;
use crate::services::vector_store::VectorStore;

/// Hands out the single logical collection, creating it lazily on first use.
///
/// Called on every ingestion and query request; the underlying
/// `ensure_collection` is idempotent and cheap when the collection already
/// exists, so no extra caching is layered on top.
pub struct CollectionManager {
    store: Arc<dyn VectorStore>,
}

impl CollectionManager {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self { store }
    }

    /// Ensure the collection exists and return the store handle bound to it.
    pub async fn get_or_create(&self) -> Result<Arc<dyn VectorStore>, VectorStoreError> {
        self.store.ensure_collection().await?;
        Ok(Arc::clone(&self.store))
    }
}
