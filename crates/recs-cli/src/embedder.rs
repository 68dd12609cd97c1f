//! The embedding model selected by `embedder.provider`.

use recs_embeddings::{
    CandleEmbedder, Embedding, EmbeddingError, EmbeddingModel, HashingEmbedder, ModelCache,
    ModelInfo,
};
use recs_types::{EmbedderProvider, EmbedderSettings, Settings};
use tracing::info;

/// Either of the shipped embedders, chosen at runtime.
pub enum ConfiguredEmbedder {
    Candle(CandleEmbedder),
    Hashing(HashingEmbedder),
}

impl ConfiguredEmbedder {
    /// Build the configured model. Slow for Candle (may download weights),
    /// so call it from the blocking pool.
    pub fn load(settings: &Settings) -> Result<Self, EmbeddingError> {
        let embedder = &settings.embedder;
        match embedder.provider {
            EmbedderProvider::Candle => {
                let cache = model_cache(settings, embedder);
                info!(repo = %embedder.model_repo, dir = ?cache.model_dir(), "Loading Candle embedder");
                Ok(Self::Candle(CandleEmbedder::load(&cache)?))
            }
            EmbedderProvider::Hashing => {
                info!(dim = embedder.dimension, "Using hashing embedder");
                Ok(Self::Hashing(HashingEmbedder::new(embedder.dimension)?))
            }
        }
    }

    fn inner(&self) -> &dyn EmbeddingModel {
        match self {
            Self::Candle(model) => model,
            Self::Hashing(model) => model,
        }
    }
}

fn model_cache(settings: &Settings, embedder: &EmbedderSettings) -> ModelCache {
    match settings.expanded_cache_dir() {
        Some(dir) => ModelCache::new(dir, embedder.model_repo.clone()),
        None => ModelCache::for_repo(embedder.model_repo.clone()),
    }
}

impl EmbeddingModel for ConfiguredEmbedder {
    fn info(&self) -> &ModelInfo {
        self.inner().info()
    }

    fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        self.inner().embed(text)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, EmbeddingError> {
        self.inner().embed_batch(texts)
    }
}
