pub mod embedding;
pub mod protocol;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixListener;
use tokio::sync::{Notify, RwLock};
use tracing::{error, info, warn};

use crate::error::{IngestError, QueryError, VectorStoreError};
use crate::models::Config;
use crate::server::embedding::{LazyEmbedder, model_dir_name};
use crate::server::protocol::{
    AddedResponse, ErrorKind, Request, Response, StatusResponse, StoreStatus, decode_length,
    encode_message,
};
use crate::services::{
    CollectionManager, Embedder, IngestionPipeline, MetricsStore, QueryPipeline, SharedEmbedder,
    VectorStore, create_backend,
};

const MAX_FRAME_BYTES: usize = 32 * 1024 * 1024;

/// The indexing daemon: owns the embedding model, the vector store backend
/// and the ingestion/query pipelines, and serves framed JSON requests over a
/// Unix socket. Each connection runs on its own task, so in-flight requests
/// suspend on the model or the store without blocking one another.
pub struct DaemonServer {
    config: Config,
    socket_path: PathBuf,
    embedder: Arc<LazyEmbedder>,
    store: Arc<dyn VectorStore>,
    ingest: IngestionPipeline,
    query: QueryPipeline,
    metrics: Option<MetricsStore>,
    last_request: RwLock<Instant>,
    requests_served: AtomicU64,
    shutdown: AtomicBool,
    shutdown_notify: Notify,
}

impl DaemonServer {
    pub async fn new(config: Config) -> Result<Self> {
        let socket_path = config.socket_path();

        let model_dir = match config.embedding.model_path.clone() {
            Some(dir) => dir,
            None => Config::models_dir()
                .context("could not determine models directory")?
                .join(model_dir_name(&config.embedding.model_id)),
        };

        let embedder = Arc::new(LazyEmbedder::new(config.embedding.clone(), model_dir));

        // Start loading the model now; requests that arrive first suspend on
        // the same initialization instead of racing it.
        let warmup = Arc::clone(&embedder);
        let model_id = config.embedding.model_id.clone();
        tokio::spawn(async move {
            info!(model = %model_id, "loading embedding model");
            match warmup.get().await {
                Ok(model) => info!(dimension = model.dimension(), "embedding model loaded"),
                Err(e) => error!(error = %e, "failed to load embedding model"),
            }
        });

        let store: Arc<dyn VectorStore> = Arc::from(
            create_backend(
                &config.vector_store,
                Arc::clone(&embedder) as SharedEmbedder,
                u64::from(config.embedding.dimension),
            )
            .await?,
        );

        let collections = Arc::new(CollectionManager::new(Arc::clone(&store)));
        let ingest = IngestionPipeline::new(
            Arc::clone(&collections),
            config.ingest.batch_size as usize,
        );
        let query = QueryPipeline::new(collections, u64::from(config.search.default_limit));

        let metrics = if config.metrics.enabled {
            match Config::metrics_db_path() {
                Some(path) => {
                    if let Some(parent) = path.parent() {
                        let _ = std::fs::create_dir_all(parent);
                    }
                    match MetricsStore::open(&path) {
                        Ok(store) => {
                            store.cleanup(config.metrics.retention_days);
                            info!(
                                retention_days = config.metrics.retention_days,
                                "metrics enabled"
                            );
                            Some(store)
                        }
                        Err(e) => {
                            warn!(error = %e, "failed to open metrics database");
                            None
                        }
                    }
                }
                None => None,
            }
        } else {
            None
        };

        Ok(Self {
            config,
            socket_path,
            embedder,
            store,
            ingest,
            query,
            metrics,
            last_request: RwLock::new(Instant::now()),
            requests_served: AtomicU64::new(0),
            shutdown: AtomicBool::new(false),
            shutdown_notify: Notify::new(),
        })
    }

    pub async fn run(self: Arc<Self>) -> Result<(), std::io::Error> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;
        self.write_pid_file()?;

        info!(socket = %self.socket_path.display(), "daemon listening");
        info!(
            idle_timeout_secs = self.config.daemon.idle_timeout_secs,
            collection = self.store.collection(),
            "serving collection"
        );

        let idle_timeout = Duration::from_secs(self.config.daemon.idle_timeout_secs);
        let check_interval = Duration::from_secs(10);

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, _)) => {
                            *self.last_request.write().await = Instant::now();
                            let server = Arc::clone(&self);
                            tokio::spawn(async move {
                                server.handle_connection(stream).await;
                            });
                        }
                        Err(e) => {
                            warn!(error = %e, "accept error");
                        }
                    }
                }
                _ = self.shutdown_notify.notified() => {
                    break;
                }
                _ = tokio::time::sleep(check_interval) => {
                    if self.shutdown.load(Ordering::Relaxed) {
                        break;
                    }
                    let last = *self.last_request.read().await;
                    if last.elapsed() > idle_timeout {
                        info!("idle timeout reached, shutting down");
                        break;
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("received SIGINT, shutting down");
                    break;
                }
            }
        }

        self.cleanup();
        Ok(())
    }

    async fn handle_connection(&self, mut stream: tokio::net::UnixStream) {
        let mut len_buf = [0u8; 4];

        while stream.read_exact(&mut len_buf).await.is_ok() {
            let len = decode_length(&len_buf);
            if len > MAX_FRAME_BYTES {
                break;
            }

            let mut msg_buf = vec![0u8; len];
            if stream.read_exact(&mut msg_buf).await.is_err() {
                break;
            }

            let request: Request = match serde_json::from_slice(&msg_buf) {
                Ok(r) => r,
                Err(e) => {
                    let response =
                        Response::error(ErrorKind::Validation, format!("invalid request: {}", e));
                    if let Ok(encoded) = encode_message(&response) {
                        let _ = stream.write_all(&encoded).await;
                    }
                    continue;
                }
            };

            let response = self.handle_request(request).await;
            self.requests_served.fetch_add(1, Ordering::Relaxed);

            if let Ok(encoded) = encode_message(&response)
                && stream.write_all(&encoded).await.is_err()
            {
                break;
            }

            if matches!(response, Response::ShutdownAck) {
                break;
            }
        }
    }

    async fn handle_request(&self, request: Request) -> Response {
        match request {
            Request::Ping => Response::Pong,

            Request::Shutdown => {
                self.shutdown.store(true, Ordering::Relaxed);
                self.shutdown_notify.notify_one();
                Response::ShutdownAck
            }

            Request::Status => Response::Status(self.status().await),

            Request::AddDocuments(req) => {
                let start = Instant::now();
                let result = self.ingest.run(&req.documents).await;
                self.record("add", start, result.is_ok());
                match result {
                    Ok(added) => Response::Added(AddedResponse {
                        success: true,
                        added,
                    }),
                    Err(e) => ingest_error_response(&e),
                }
            }

            Request::Search(req) => {
                let start = Instant::now();
                let result = self.query.run(req.q.as_deref()).await;
                self.record("search", start, result.is_ok());
                match result {
                    Ok(results) => Response::Search(results),
                    Err(e) => query_error_response(&e),
                }
            }
        }
    }

    async fn status(&self) -> StatusResponse {
        let last = *self.last_request.read().await;
        let connected = self.store.health_check().await.unwrap_or(false);
        let points_count = if connected {
            self.store
                .collection_info()
                .await
                .ok()
                .flatten()
                .map_or(0, |info| info.points_count)
        } else {
            0
        };

        let metrics_summary = self
            .metrics
            .as_ref()
            .map(|m| m.get_summary(self.config.metrics.retention_days));

        StatusResponse {
            running: true,
            embedding_model: self.embedder.model_id().to_string(),
            model_ready: self.embedder.ready(),
            store: StoreStatus {
                driver: self.config.vector_store.driver.to_string(),
                url: self.config.vector_store.url.clone(),
                collection: self.store.collection().to_string(),
                connected,
                points_count,
            },
            idle_secs: last.elapsed().as_secs(),
            requests_served: self.requests_served.load(Ordering::Relaxed),
            metrics: metrics_summary,
        }
    }

    fn record(&self, operation: &str, start: Instant, success: bool) {
        if let Some(ref metrics) = self.metrics {
            metrics.record(operation, start.elapsed().as_millis() as u64, success);
        }
    }

    fn write_pid_file(&self) -> Result<(), std::io::Error> {
        let pid_path = self.config.pid_path();
        std::fs::write(&pid_path, std::process::id().to_string())
    }

    fn cleanup(&self) {
        let _ = std::fs::remove_file(&self.socket_path);
        let _ = std::fs::remove_file(self.config.pid_path());
        info!("daemon stopped");
    }
}

/// Map an ingestion failure to a wire error. An embedding failure on this
/// path is logged in full but reported with a generic message; store failures
/// pass the underlying message through.
fn ingest_error_response(err: &IngestError) -> Response {
    match err {
        IngestError::Validation(e) => Response::error(ErrorKind::Validation, e.to_string()),
        IngestError::Store(VectorStoreError::Embedding(e)) => {
            error!(error = %e, "embedding failed while adding documents");
            Response::error(ErrorKind::Embedding, "failed to generate embeddings")
        }
        IngestError::Store(e) => {
            error!(error = %e, "store failure while adding documents");
            Response::error(ErrorKind::Store, e.to_string())
        }
    }
}

/// Map a search failure to a wire error. The search path passes lower-level
/// failure messages through for diagnostics.
fn query_error_response(err: &QueryError) -> Response {
    match err {
        QueryError::Validation(e) => Response::error(ErrorKind::Validation, e.to_string()),
        QueryError::Store(VectorStoreError::Embedding(e)) => {
            error!(error = %e, "embedding failed while searching");
            Response::error(ErrorKind::Embedding, e.to_string())
        }
        QueryError::Store(e) => {
            error!(error = %e, "store failure while searching");
            Response::error(ErrorKind::Store, e.to_string())
        }
    }
}

pub async fn run_daemon(config: Config) -> Result<()> {
    let server = Arc::new(DaemonServer::new(config).await?);
    server.run().await?;
    Ok(())
}
