//! Candle-based embedding implementation.
//!
//! Runs all-MiniLM-L6-v2 locally and produces 384-dimensional vectors.

use std::path::Path;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use tokenizers::Tokenizer;
use tracing::{debug, info};

use crate::cache::{get_or_download_model, ModelCache};
use crate::error::EmbeddingError;
use crate::model::{Embedding, EmbeddingModel, ModelInfo};

/// Embedding dimension for all-MiniLM-L6-v2
pub const EMBEDDING_DIM: usize = 384;

/// Maximum sequence length; longer descriptions are truncated
pub const MAX_SEQ_LENGTH: usize = 256;

/// Candle-based embedder using all-MiniLM-L6-v2.
pub struct CandleEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    info: ModelInfo,
}

impl CandleEmbedder {
    /// Load the embedding model from cache (downloading if needed).
    pub fn load(cache: &ModelCache) -> Result<Self, EmbeddingError> {
        let paths = get_or_download_model(cache)?;
        Self::load_from_paths(&paths.config, &paths.tokenizer, &paths.weights)
    }

    /// Load with default cache settings
    pub fn load_default() -> Result<Self, EmbeddingError> {
        Self::load(&ModelCache::default())
    }

    /// Load from explicit file paths
    pub fn load_from_paths(
        config_path: &Path,
        tokenizer_path: &Path,
        weights_path: &Path,
    ) -> Result<Self, EmbeddingError> {
        info!(config = ?config_path, "Loading embedding model");

        let device = Device::Cpu;

        let config_str = std::fs::read_to_string(config_path)?;
        let config: BertConfig = serde_json::from_str(&config_str)
            .map_err(|e| EmbeddingError::ModelNotFound(format!("Invalid config: {}", e)))?;

        let mut tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| EmbeddingError::Tokenizer(e.to_string()))?;
        // Padding is done by hand below so the attention mask stays exact.
        tokenizer.with_padding(None);

        // SAFETY: the weights file is owned by the model cache and not
        // modified while the model is alive.
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path.to_path_buf()], DType::F32, &device)?
        };
        let model = BertModel::load(vb, &config)?;

        info!(
            dim = EMBEDDING_DIM,
            max_seq = MAX_SEQ_LENGTH,
            "Embedding model loaded"
        );

        Ok(Self {
            model,
            tokenizer,
            device,
            info: ModelInfo {
                name: "all-MiniLM-L6-v2".to_string(),
                dimension: EMBEDDING_DIM,
                max_sequence_length: MAX_SEQ_LENGTH,
            },
        })
    }

    /// Mean pooling over token embeddings, ignoring padding positions.
    fn mean_pooling(
        &self,
        embeddings: &Tensor,
        attention_mask: &Tensor,
    ) -> Result<Tensor, EmbeddingError> {
        let mask = attention_mask
            .unsqueeze(2)?
            .broadcast_as(embeddings.shape())?
            .to_dtype(DType::F32)?;

        let sum = embeddings.broadcast_mul(&mask)?.sum(1)?;
        let counts = mask.sum(1)?.clamp(1e-9, f64::MAX)?;

        Ok(sum.broadcast_div(&counts)?)
    }
}

impl EmbeddingModel for CandleEmbedder {
    fn info(&self) -> &ModelInfo {
        &self.info
    }

    fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        self.embed_batch(&[text])?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::InvalidInput("empty batch output".to_string()))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        debug!(count = texts.len(), "Embedding batch");

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| EmbeddingError::Tokenizer(e.to_string()))?;

        let max_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0)
            .min(MAX_SEQ_LENGTH);

        let batch_size = texts.len();
        let mut ids_flat: Vec<u32> = Vec::with_capacity(batch_size * max_len);
        let mut mask_flat: Vec<u32> = Vec::with_capacity(batch_size * max_len);

        for encoding in &encodings {
            let len = encoding.get_ids().len().min(max_len);

            ids_flat.extend_from_slice(&encoding.get_ids()[..len]);
            ids_flat.extend(std::iter::repeat(0).take(max_len - len));

            mask_flat.extend_from_slice(&encoding.get_attention_mask()[..len]);
            mask_flat.extend(std::iter::repeat(0).take(max_len - len));
        }

        let input_ids = Tensor::from_vec(ids_flat, (batch_size, max_len), &self.device)?;
        let attention_mask = Tensor::from_vec(mask_flat, (batch_size, max_len), &self.device)?;
        let token_type_ids = input_ids.zeros_like()?;

        let output = self
            .model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))?;

        let pooled: Vec<Vec<f32>> = self.mean_pooling(&output, &attention_mask)?.to_vec2()?;

        let embeddings: Vec<Embedding> = pooled.into_iter().map(Embedding::new).collect();

        debug!(
            count = embeddings.len(),
            dim = EMBEDDING_DIM,
            "Batch complete"
        );

        Ok(embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Model-backed tests need network access on first run:
    // cargo test -p recs-embeddings -- --ignored

    #[test]
    #[ignore = "requires model download"]
    fn test_embed_is_unit_length() {
        let embedder = CandleEmbedder::load_default().unwrap();
        let emb = embedder.embed("Funny cat compilation").unwrap();
        assert_eq!(emb.dimension(), EMBEDDING_DIM);
        assert!((emb.norm() - 1.0).abs() < 1e-4);
    }

    #[test]
    #[ignore = "requires model download"]
    fn test_embed_batch_matches_single() {
        let embedder = CandleEmbedder::load_default().unwrap();
        let batch = embedder
            .embed_batch(&["Cooking pasta at home", "Cats playing piano"])
            .unwrap();
        let single = embedder.embed("Cats playing piano").unwrap();
        assert_eq!(batch.len(), 2);
        assert!(batch[1].cosine_similarity(&single) > 0.99);
    }

    #[test]
    #[ignore = "requires model download"]
    fn test_related_titles_score_higher() {
        let embedder = CandleEmbedder::load_default().unwrap();
        let cats = embedder.embed("Cats Videos about cats pets cats").unwrap();
        let query = embedder.embed("cute cat").unwrap();
        let cars = embedder.embed("Engine rebuild for a classic car").unwrap();

        assert!(cats.cosine_similarity(&query) > cars.cosine_similarity(&query));
    }
}
