use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use ndarray::ArrayViewD;
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;
use tokenizers::Tokenizer;
use tokenizers::{PaddingParams, PaddingStrategy, TruncationParams, TruncationStrategy};
use tokio::sync::OnceCell;

use crate::error::EmbeddingError;
use crate::models::EmbeddingConfig;
use crate::services::Embedder;

/// ONNX embedding model: tokenize, run the session, mean-pool the token
/// states and L2-normalize. Caller batches of any size are split into chunks
/// of `batch_size` (default 8) before hitting the model, which bounds peak
/// memory without changing the one-vector-per-text output contract.
pub struct OnnxEmbedder {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    dimension: usize,
    batch_size: usize,
}

impl OnnxEmbedder {
    pub fn load(config: &EmbeddingConfig, model_dir: &Path) -> Result<Self, EmbeddingError> {
        let model_path = model_dir.join("model.onnx");
        let tokenizer_path = model_dir.join("tokenizer.json");
        let max_tokens = config.max_tokens as usize;

        if !model_path.exists() {
            return Err(EmbeddingError::NotFound(format!(
                "model not found: {}",
                model_path.display()
            )));
        }

        let session = Session::builder()
            .map_err(|e: ort::Error| EmbeddingError::Load(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e: ort::Error| EmbeddingError::Load(e.to_string()))?
            .with_intra_threads(num_cpus())
            .map_err(|e: ort::Error| EmbeddingError::Load(e.to_string()))?
            .commit_from_file(&model_path)
            .map_err(|e: ort::Error| EmbeddingError::Load(e.to_string()))?;

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| EmbeddingError::Tokenizer(e.to_string()))?;

        // Truncation keeps long documents from exhausting memory
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: max_tokens,
                strategy: TruncationStrategy::LongestFirst,
                ..Default::default()
            }))
            .map_err(|e| EmbeddingError::Tokenizer(e.to_string()))?;

        // Pad to the longest sequence in each batch
        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            ..Default::default()
        }));

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            dimension: config.dimension as usize,
            batch_size: config.batch_size.max(1) as usize,
        })
    }

    /// Embed any number of texts, invoking the model in bounded chunks.
    /// Output is one unit vector per input text, in input order.
    pub fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut all_embeddings = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size) {
            all_embeddings.extend(self.embed_chunk(chunk)?);
        }
        Ok(all_embeddings)
    }

    fn embed_chunk(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| EmbeddingError::Tokenizer(e.to_string()))?;

        let max_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0);
        let batch_size = encodings.len();

        let mut input_ids = vec![0i64; batch_size * max_len];
        let mut attention_mask = vec![0i64; batch_size * max_len];
        let token_type_ids = vec![0i64; batch_size * max_len];
        let mut masks: Vec<Vec<i64>> = Vec::with_capacity(batch_size);

        for (i, encoding) in encodings.iter().enumerate() {
            let ids = encoding.get_ids();
            let mask = encoding.get_attention_mask();
            for (j, (&id, &m)) in ids.iter().zip(mask.iter()).enumerate() {
                input_ids[i * max_len + j] = id as i64;
                attention_mask[i * max_len + j] = m as i64;
            }
            masks.push(attention_mask[i * max_len..i * max_len + max_len].to_vec());
        }

        let input_ids_tensor = Tensor::from_array(([batch_size, max_len], input_ids))
            .map_err(|e: ort::Error| EmbeddingError::Inference(e.to_string()))?;
        let attention_mask_tensor = Tensor::from_array(([batch_size, max_len], attention_mask))
            .map_err(|e: ort::Error| EmbeddingError::Inference(e.to_string()))?;
        let token_type_ids_tensor = Tensor::from_array(([batch_size, max_len], token_type_ids))
            .map_err(|e: ort::Error| EmbeddingError::Inference(e.to_string()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| EmbeddingError::Inference("session lock poisoned".to_string()))?;

        let outputs = session
            .run(ort::inputs![
                input_ids_tensor,
                attention_mask_tensor,
                token_type_ids_tensor
            ])
            .map_err(|e: ort::Error| EmbeddingError::Inference(e.to_string()))?;

        let output_array = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e: ort::Error| EmbeddingError::Inference(e.to_string()))?;

        pool_and_normalize(&output_array, &masks, self.dimension)
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Reduce model output to one unit vector per text. Token-level output
/// (`[batch, seq, hidden]`) is mean-pooled over the attention mask; already
/// pooled output (`[batch, hidden]`) is normalized as-is.
fn pool_and_normalize(
    output: &ArrayViewD<'_, f32>,
    masks: &[Vec<i64>],
    dimension: usize,
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let shape = output.shape();

    match shape.len() {
        3 => {
            let hidden = shape[2];
            if hidden < dimension {
                return Err(EmbeddingError::Inference(format!(
                    "model hidden size {} smaller than configured dimension {}",
                    hidden, dimension
                )));
            }
            let embeddings = masks
                .iter()
                .enumerate()
                .map(|(i, mask)| {
                    let mut pooled = vec![0.0f32; dimension];
                    let mut count = 0.0f32;
                    for (j, &m) in mask.iter().enumerate() {
                        if m == 0 {
                            continue;
                        }
                        count += 1.0;
                        for (d, slot) in pooled.iter_mut().enumerate() {
                            *slot += output[[i, j, d]];
                        }
                    }
                    if count > 0.0 {
                        for slot in &mut pooled {
                            *slot /= count;
                        }
                    }
                    normalize(&pooled)
                })
                .collect();
            Ok(embeddings)
        }
        2 => {
            if shape[1] < dimension {
                return Err(EmbeddingError::Inference(format!(
                    "model hidden size {} smaller than configured dimension {}",
                    shape[1], dimension
                )));
            }
            let embeddings = (0..masks.len())
                .map(|i| {
                    let embedding: Vec<f32> =
                        (0..dimension).map(|d| output[[i, d]]).collect();
                    normalize(&embedding)
                })
                .collect();
            Ok(embeddings)
        }
        _ => Err(EmbeddingError::Inference(format!(
            "unexpected output shape: {:?}",
            shape
        ))),
    }
}

fn normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter().map(|x| x / norm).collect()
    } else {
        v.to_vec()
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Process-wide embedding model with one-time asynchronous initialization.
///
/// The daemon kicks off initialization once at startup; every caller awaits
/// the same cell, so requests arriving before the model has finished loading
/// suspend instead of racing a half-initialized handle.
pub struct LazyEmbedder {
    config: EmbeddingConfig,
    model_dir: PathBuf,
    cell: OnceCell<OnnxEmbedder>,
}

impl LazyEmbedder {
    pub fn new(config: EmbeddingConfig, model_dir: PathBuf) -> Self {
        Self {
            config,
            model_dir,
            cell: OnceCell::new(),
        }
    }

    /// Resolve the model, loading it on first call. The load runs on the
    /// blocking pool; concurrent callers share one initialization.
    pub async fn get(&self) -> Result<&OnnxEmbedder, EmbeddingError> {
        self.cell
            .get_or_try_init(|| {
                let config = self.config.clone();
                let model_dir = self.model_dir.clone();
                async move {
                    tokio::task::spawn_blocking(move || OnnxEmbedder::load(&config, &model_dir))
                        .await
                        .map_err(|e| EmbeddingError::Load(e.to_string()))?
                }
            })
            .await
    }

    pub fn ready(&self) -> bool {
        self.cell.initialized()
    }
}

#[async_trait]
impl Embedder for LazyEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let model = self.get().await?;
        model.embed_texts(texts)
    }

    fn model_id(&self) -> &str {
        &self.config.model_id
    }
}

/// Directory name a model id maps to under the models dir.
pub fn model_dir_name(model_id: &str) -> String {
    model_id.replace('/', "--")
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn test_normalize_produces_unit_vectors() {
        let normalized = normalize(&[3.0, 4.0]);
        let norm: f32 = normalized.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
        assert!((normalized[0] - 0.6).abs() < 1e-6);
        assert!((normalized[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_zero_vector_unchanged() {
        assert_eq!(normalize(&[0.0, 0.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn test_mean_pool_respects_attention_mask() {
        // 1 text, 3 token positions, 2 hidden dims; the last position is
        // padding and must not contribute.
        let output = Array3::from_shape_vec(
            (1, 3, 2),
            vec![1.0, 0.0, 3.0, 4.0, 100.0, 100.0],
        )
        .unwrap();
        let masks = vec![vec![1i64, 1, 0]];

        let pooled = pool_and_normalize(&output.view().into_dyn(), &masks, 2).unwrap();

        // Mean of [1,0] and [3,4] is [2,2], normalized to a unit vector.
        let expected = normalize(&[2.0, 2.0]);
        assert_eq!(pooled.len(), 1);
        for (got, want) in pooled[0].iter().zip(expected.iter()) {
            assert!((got - want).abs() < 1e-6);
        }
    }

    #[test]
    fn test_pooled_output_is_unit_norm() {
        let output =
            Array3::from_shape_vec((2, 2, 3), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 0.5, 0.25, 0.125, 7.0, 8.0, 9.0])
                .unwrap();
        let masks = vec![vec![1i64, 1], vec![1i64, 0]];

        let pooled = pool_and_normalize(&output.view().into_dyn(), &masks, 3).unwrap();

        for vector in pooled {
            let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_unexpected_shape_is_rejected() {
        let output = ndarray::Array1::from_vec(vec![1.0f32, 2.0]).into_dyn();
        let result = pool_and_normalize(&output.view(), &[vec![1]], 2);
        assert!(matches!(result, Err(EmbeddingError::Inference(_))));
    }

    #[test]
    fn test_model_dir_name() {
        assert_eq!(
            model_dir_name("sentence-transformers/all-MiniLM-L6-v2"),
            "sentence-transformers--all-MiniLM-L6-v2"
        );
    }

    #[test]
    fn test_lazy_embedder_not_ready_before_first_use() {
        let lazy = LazyEmbedder::new(EmbeddingConfig::default(), PathBuf::from("/nonexistent"));
        assert!(!lazy.ready());
    }

    #[tokio::test]
    async fn test_lazy_embedder_surfaces_missing_model() {
        let lazy = LazyEmbedder::new(EmbeddingConfig::default(), PathBuf::from("/nonexistent"));
        let result = lazy.get().await;
        assert!(matches!(result, Err(EmbeddingError::NotFound(_))));
        // A failed initialization leaves the cell empty for a later retry.
        assert!(!lazy.ready());
    }
}
