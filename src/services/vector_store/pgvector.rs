//! PostgreSQL/pgvector vector store backend implementation.

use async_trait::async_trait;
use pgvector::Vector;
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use std::time::Duration;

use super::{CollectionInfo, QueryMatch, VectorStore};
use crate::error::VectorStoreError;
use crate::models::{DocumentRecord, VectorStoreConfig};
use crate::services::embedding::SharedEmbedder;

/// PostgreSQL backend. The collection name doubles as the table name; KNN
/// queries use the pgvector `<=>` cosine distance operator, which already
/// orders ascending-is-closer.
pub struct PgVectorBackend {
    pool: PgPool,
    collection: String,
    embedder: SharedEmbedder,
    embedding_dim: u64,
}

impl PgVectorBackend {
    pub async fn new(
        config: &VectorStoreConfig,
        embedder: SharedEmbedder,
        embedding_dim: u64,
    ) -> Result<Self, VectorStoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_max)
            .acquire_timeout(Duration::from_secs(config.pool_acquire_timeout.into()))
            .connect(&config.url)
            .await
            .map_err(|e| VectorStoreError::Connection(e.to_string()))?;

        let backend = Self {
            pool,
            collection: config.collection.clone(),
            embedder,
            embedding_dim,
        };

        backend.check_pgvector_extension().await?;

        Ok(backend)
    }

    async fn check_pgvector_extension(&self) -> Result<(), VectorStoreError> {
        let result: Option<(String,)> =
            sqlx::query_as("SELECT extname FROM pg_extension WHERE extname = 'vector'")
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| VectorStoreError::Postgres(e.to_string()))?;

        if result.is_none() {
            return Err(VectorStoreError::Extension(
                "pgvector extension is not installed. Run: CREATE EXTENSION vector;".to_string(),
            ));
        }

        Ok(())
    }
}

#[async_trait]
impl VectorStore for PgVectorBackend {
    async fn health_check(&self) -> Result<bool, VectorStoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| true)
            .map_err(|e| VectorStoreError::Connection(e.to_string()))
    }

    async fn collection_info(&self) -> Result<Option<CollectionInfo>, VectorStoreError> {
        let table_exists: Option<(String,)> = sqlx::query_as(
            "SELECT table_name FROM information_schema.tables WHERE table_name = $1",
        )
        .bind(&self.collection)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| VectorStoreError::Postgres(e.to_string()))?;

        if table_exists.is_none() {
            return Ok(None);
        }

        let query = format!("SELECT COUNT(*) as count FROM {}", self.collection);
        let row: (i64,) = sqlx::query_as(&query)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| VectorStoreError::Postgres(e.to_string()))?;

        Ok(Some(CollectionInfo {
            points_count: row.0 as u64,
        }))
    }

    async fn ensure_collection(&self) -> Result<(), VectorStoreError> {
        if self.collection_info().await?.is_some() {
            return Ok(());
        }

        let create_table = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id UUID PRIMARY KEY,
                document TEXT NOT NULL,
                embedding vector({}) NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
            self.collection, self.embedding_dim
        );

        sqlx::query(&create_table)
            .execute(&self.pool)
            .await
            .map_err(|e| VectorStoreError::Collection(e.to_string()))?;

        let index_sql = format!(
            "CREATE INDEX IF NOT EXISTS {}_embedding_idx ON {} USING hnsw (embedding vector_cosine_ops)",
            self.collection, self.collection
        );

        sqlx::query(&index_sql)
            .execute(&self.pool)
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

        let insert = format!(
            "INSERT INTO {} (id, document, embedding, created_at) VALUES ($1, $2, $3, $4)",
            self.collection
        );

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| VectorStoreError::Add(e.to_string()))?;

        for (record, vector) in records.iter().zip(vectors) {
            let id = uuid::Uuid::parse_str(&record.id)
                .map_err(|e| VectorStoreError::Add(format!("invalid record id: {}", e)))?;
            let embedding = Vector::from(vector);

            sqlx::query(&insert)
                .bind(id)
                .bind(&record.content)
                .bind(&embedding)
                .bind(&record.created_at)
                .execute(&mut *tx)
                .await
                .map_err(|e| VectorStoreError::Add(e.to_string()))?;
        }

        tx.commit()
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

        let select = format!(
            r#"
            SELECT
                id::text as id,
                document,
                (embedding <=> $1)::float4 as distance
            FROM {}
            ORDER BY embedding <=> $1
            LIMIT {}
            "#,
            self.collection, limit
        );

        let mut all_matches = Vec::with_capacity(query_vectors.len());
        for query_vector in query_vectors {
            let embedding = Vector::from(query_vector);

            let rows = sqlx::query(&select)
                .bind(&embedding)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| VectorStoreError::Query(e.to_string()))?;

            let matches = rows
                .into_iter()
                .map(|row: PgRow| QueryMatch {
                    id: row.get("id"),
                    document: row.get("document"),
                    distance: row.get("distance"),
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
