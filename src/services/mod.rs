mod collection;
mod embedding;
mod ingest;
mod metrics;
mod query;
mod vector_store;

pub use collection::CollectionManager;
pub use embedding::{Embedder, SharedEmbedder};
pub use ingest::{IngestionPipeline, parse_documents};
pub use metrics::{MetricsStore, MetricsSummary};
pub use query::QueryPipeline;
pub use vector_store::{
    CollectionInfo, PgVectorBackend, QdrantBackend, QueryMatch, VectorStore, create_backend,
};
