//! # recs-engine
//!
//! Semantic video recommendations.
//!
//! [`RecommendationEngine`] keeps one embedding per video in a named vector
//! collection and answers "which videos are closest to this text" queries.
//! The embedder and the vector store are injected, so tests run against the
//! hashing embedder and the in-memory store while production wires in the
//! Candle model and the HNSW store.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use recs_embeddings::{HashingEmbedder, LazyEmbedder};
//! use recs_engine::{EngineConfig, RecommendationEngine};
//! use recs_vector::MemoryStore;
//!
//! # async fn demo() -> Result<(), recs_engine::EngineError> {
//! let embedder = Arc::new(LazyEmbedder::new(|| HashingEmbedder::new(384)));
//! let engine = RecommendationEngine::new(embedder, Arc::new(MemoryStore::new()), EngineConfig::default());
//! engine.initialize().await?;
//!
//! engine
//!     .add_or_update_video("v1", "Cats", "Videos about cats", &["pets".into(), "cats".into()])
//!     .await?;
//! let ids = engine.get_recommendations("cute cat", 5).await?;
//! assert_eq!(ids, vec!["v1".to_string()]);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod locks;
pub mod types;

pub use config::EngineConfig;
pub use engine::{EngineState, RecommendationEngine};
pub use error::{Cause, EngineError};
pub use locks::{KeyGuard, KeyedLocks};
pub use types::{CollectionStats, IndexingStats, Recommendation};
