//! Qdrant vector store backend implementation.

use async_trait::async_trait;
use qdrant_client::Qdrant;
use qdrant_client::qdrant::{
    CreateCollectionBuilder, Distance, PointStruct, SearchPointsBuilder, UpsertPointsBuilder,
    VectorParamsBuilder,
};
use std::collections::HashMap;

use super::{CollectionInfo, QueryMatch, VectorStore};
use crate::error::VectorStoreError;
use crate::models::{DocumentRecord, VectorStoreConfig};
use crate::services::embedding::SharedEmbedder;

/// Qdrant vector store backend, bound to one collection and one embedder.
pub struct QdrantBackend {
    client: Qdrant,
    collection: String,
    embedder: SharedEmbedder,
    embedding_dim: u64,
}

impl QdrantBackend {
    /// Create a new Qdrant backend from configuration.
    pub fn new(
        config: &VectorStoreConfig,
        embedder: SharedEmbedder,
        embedding_dim: u64,
    ) -> Result<Self, VectorStoreError> {
        let mut builder = Qdrant::from_url(&config.url);

        if let Some(ref api_key) = config.api_key {
            builder = builder.api_key(api_key.clone());
        }

        let client = builder
            .build()
            .map_err(|e| VectorStoreError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            collection: config.collection.clone(),
            embedder,
            embedding_dim,
        })
    }

    fn payload_str(
        payload: &HashMap<String, qdrant_client::qdrant::Value>,
        key: &str,
    ) -> Option<String> {
        payload.get(key).and_then(|v| match &v.kind {
            Some(qdrant_client::qdrant::value::Kind::StringValue(s)) => Some(s.clone()),
            _ => None,
        })
    }
}

#[async_trait]
impl VectorStore for QdrantBackend {
    async fn health_check(&self) -> Result<bool, VectorStoreError> {
        self.client
            .health_check()
            .await
            .map(|_| true)
            .map_err(|e| VectorStoreError::Connection(e.to_string()))
    }

    async fn collection_info(&self) -> Result<Option<CollectionInfo>, VectorStoreError> {
        match self.client.collection_info(&self.collection).await {
            Ok(info) => Ok(Some(CollectionInfo {
                points_count: info.result.map_or(0, |r| r.points_count.unwrap_or(0)),
            })),
            Err(e) => {
                let msg = e.to_string();
                if msg.contains("not found") || msg.contains("doesn't exist") {
                    Ok(None)
                } else {
                    Err(VectorStoreError::Collection(msg))
                }
            }
        }
    }

    async fn ensure_collection(&self) -> Result<(), VectorStoreError> {
        if self.collection_info().await?.is_some() {
            return Ok(());
        }

        let create_collection = CreateCollectionBuilder::new(&self.collection).vectors_config(
            VectorParamsBuilder::new(self.embedding_dim, Distance::Cosine),
        );

        self.client
            .create_collection(create_collection)
            .await
            .map_err(|e| VectorStoreError::Collection(e.to_string()))?;

        Ok(())
    }

    async fn add(&self, records: &[DocumentRecord]) -> Result<(), VectorStoreError> {
        if records.is_empty() {
            return Ok(());
        }

        let texts: Vec<String> = records.iter().map(|r| r.content.clone()).collect();
        let vectors = self.embedder.embed(&texts).await?;

        let points: Vec<PointStruct> = records
            .iter()
            .zip(vectors)
            .map(|(record, vector)| {
                let mut payload: HashMap<String, qdrant_client::qdrant::Value> = HashMap::new();
                payload.insert("document".to_string(), record.content.clone().into());
                payload.insert("created_at".to_string(), record.created_at.clone().into());

                PointStruct::new(record.id.clone(), vector, payload)
            })
            .collect();

        let upsert = UpsertPointsBuilder::new(&self.collection, points);

        self.client
            .upsert_points(upsert)
            .await
            .map_err(|e| VectorStoreError::Add(e.to_string()))?;

        Ok(())
    }

    async fn query(
        &self,
        texts: &[String],
        limit: u64,
    ) -> Result<Vec<Vec<QueryMatch>>, VectorStoreError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let query_vectors = self.embedder.embed(texts).await?;

        let mut all_matches = Vec::with_capacity(query_vectors.len());
        for query_vector in query_vectors {
            let search = SearchPointsBuilder::new(&self.collection, query_vector, limit)
                .with_payload(true);

            let results = self
                .client
                .search_points(search)
                .await
                .map_err(|e| VectorStoreError::Query(e.to_string()))?;

            let matches: Vec<QueryMatch> = results
                .result
                .into_iter()
                .map(|point| {
                    let document =
                        Self::payload_str(&point.payload, "document").unwrap_or_default();

                    let id = match &point.id {
                        Some(id) => match &id.point_id_options {
                            Some(qdrant_client::qdrant::point_id::PointIdOptions::Uuid(uuid)) => {
                                uuid.clone()
                            }
                            Some(qdrant_client::qdrant::point_id::PointIdOptions::Num(num)) => {
                                num.to_string()
                            }
                            None => String::new(),
                        },
                        None => String::new(),
                    };

                    // Qdrant reports cosine similarity (higher = closer);
                    // callers rank by cosine distance.
                    QueryMatch {
                        id,
                        document,
                        distance: 1.0 - point.score,
                    }
                })
                .collect();

            all_matches.push(matches);
        }

        Ok(all_matches)
    }

    fn collection(&self) -> &str {
        &self.collection
    }
}
