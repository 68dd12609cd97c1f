//! Engine error types.
//!
//! Every operation failure carries a fixed message and keeps the underlying
//! embedding, storage or task error as its source.

use recs_embeddings::EmbeddingError;
use recs_vector::VectorError;
use thiserror::Error;
use tokio::task::JoinError;

/// Lower-level failure behind an [`EngineError`].
#[derive(Debug, Error)]
pub enum Cause {
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Vector(#[from] VectorError),

    #[error("Blocking task failed: {0}")]
    Task(#[from] JoinError),
}

impl Cause {
    /// Whether trying again could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Cause::Embedding(EmbeddingError::Io(_)) => true,
            Cause::Embedding(_) => false,
            Cause::Vector(e) => e.is_transient(),
            Cause::Task(e) => e.is_cancelled(),
        }
    }
}

/// Errors returned by the recommendation engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Recommendation engine is not initialized")]
    NotInitialized,

    #[error("Video collection is not initialized")]
    CollectionNotInitialized,

    #[error("Failed to initialize recommendation engine")]
    Initialization(#[source] Cause),

    #[error("Failed to generate embedding")]
    Embedding(#[source] Cause),

    #[error("Failed to add or update video {video_id}")]
    Upsert {
        video_id: String,
        #[source]
        source: Cause,
    },

    #[error("Failed to delete video {video_id}")]
    Delete {
        video_id: String,
        #[source]
        source: Cause,
    },

    #[error("Failed to get recommendations")]
    Query(#[source] Cause),

    #[error("Failed to clear collection")]
    Clear(#[source] Cause),

    #[error("Failed to read collection stats")]
    Stats(#[source] Cause),

    #[error("Recommendation limit must be at least 1")]
    InvalidLimit,
}

impl EngineError {
    /// The wrapped lower-level error, if any.
    pub fn cause(&self) -> Option<&Cause> {
        match self {
            EngineError::Initialization(cause)
            | EngineError::Embedding(cause)
            | EngineError::Query(cause)
            | EngineError::Clear(cause)
            | EngineError::Stats(cause) => Some(cause),
            EngineError::Upsert { source, .. } | EngineError::Delete { source, .. } => Some(source),
            EngineError::NotInitialized
            | EngineError::CollectionNotInitialized
            | EngineError::InvalidLimit => None,
        }
    }

    /// True when the failure came from a transient cause (I/O, database,
    /// cancelled blocking task). Lifecycle and argument errors never are.
    pub fn is_retryable(&self) -> bool {
        self.cause().is_some_and(Cause::is_transient)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_source_is_preserved() {
        let err = EngineError::Upsert {
            video_id: "v1".to_string(),
            source: Cause::Vector(VectorError::DimensionMismatch {
                expected: 384,
                actual: 3,
            }),
        };

        assert_eq!(err.to_string(), "Failed to add or update video v1");
        let source = err.source().expect("source");
        assert!(source.to_string().contains("384"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_retryable_causes() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow disk");
        assert!(EngineError::Query(Cause::Vector(VectorError::Io(io))).is_retryable());

        let io = std::io::Error::new(std::io::ErrorKind::Other, "read");
        assert!(EngineError::Embedding(Cause::Embedding(EmbeddingError::Io(io))).is_retryable());

        assert!(!EngineError::Embedding(Cause::Embedding(EmbeddingError::Tokenizer(
            "bad".to_string()
        )))
        .is_retryable());
        assert!(!EngineError::NotInitialized.is_retryable());
        assert!(!EngineError::InvalidLimit.is_retryable());
    }

    #[test]
    fn test_lifecycle_errors_have_no_cause() {
        assert!(EngineError::CollectionNotInitialized.cause().is_none());
        assert!(EngineError::CollectionNotInitialized.source().is_none());
    }
}
