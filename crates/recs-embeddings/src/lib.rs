//! # recs-embeddings
//!
//! Text embeddings for the video recommendation engine.
//!
//! Turns a video's title, description and tags (or a free-text query) into a
//! unit-length vector so that similarity is a plain dot product.
//!
//! ## Features
//! - Local inference via Candle (all-MiniLM-L6-v2, 384 dimensions)
//! - Attention-masked mean pooling and L2 normalization
//! - Automatic model file caching
//! - Deterministic hashing embedder for offline use and tests
//! - Load-once handle shared by every engine in the process

pub mod cache;
pub mod candle;
pub mod error;
pub mod hashing;
pub mod lazy;
pub mod model;

pub use crate::candle::{CandleEmbedder, EMBEDDING_DIM};
pub use cache::{get_or_download_model, ModelCache, ModelPaths, DEFAULT_MODEL_REPO, MODEL_FILES};
pub use error::EmbeddingError;
pub use hashing::HashingEmbedder;
pub use lazy::LazyEmbedder;
pub use model::{Embedding, EmbeddingModel, ModelInfo};
