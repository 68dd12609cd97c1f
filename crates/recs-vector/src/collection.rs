//! Store and collection traits.
//!
//! These mirror the operations the engine needs from any vector database:
//! get-or-create and delete a named collection, then upsert, delete and query
//! records inside it.

use std::sync::Arc;

use async_trait::async_trait;
use recs_embeddings::Embedding;
use recs_types::{VideoEmbeddingRecord, VideoMetadata};

use crate::error::VectorError;

/// Longest accepted collection name
const MAX_COLLECTION_NAME: usize = 64;

/// One hit of a nearest-neighbor query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryMatch {
    pub video_id: String,
    /// Cosine similarity, higher = closer
    pub score: f32,
    pub metadata: VideoMetadata,
}

/// A named set of video vectors.
#[async_trait]
pub trait Collection: Send + Sync {
    /// Collection name
    fn name(&self) -> &str;

    /// Insert or replace records, keyed by `video_id`.
    ///
    /// All vectors must share the collection's dimension. If the batch holds
    /// the same id twice, the later record wins.
    async fn upsert(&self, records: Vec<VideoEmbeddingRecord>) -> Result<(), VectorError>;

    /// Remove records by id. Unknown ids are ignored.
    async fn delete(&self, ids: &[String]) -> Result<(), VectorError>;

    /// Nearest neighbors for each query embedding.
    ///
    /// Returns one list per query, closest first, with at most `n_results`
    /// entries (fewer when the collection is smaller).
    async fn query(
        &self,
        query_embeddings: &[Embedding],
        n_results: usize,
    ) -> Result<Vec<Vec<QueryMatch>>, VectorError>;

    /// Number of records
    async fn count(&self) -> Result<usize, VectorError>;

    /// Vector dimension, fixed by the first upsert
    async fn dimension(&self) -> Result<Option<usize>, VectorError>;
}

/// A vector database holding named collections.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Open the named collection, creating it empty if missing.
    async fn get_or_create_collection(&self, name: &str)
        -> Result<Arc<dyn Collection>, VectorError>;

    /// Delete the named collection and all its records. Missing names are
    /// a no-op. Open handles to it fail with `CollectionDropped` afterwards.
    async fn delete_collection(&self, name: &str) -> Result<(), VectorError>;

    /// Names of existing collections, sorted
    async fn list_collections(&self) -> Result<Vec<String>, VectorError>;
}

/// Collection names are 1-64 chars of `[A-Za-z0-9_-]`.
pub fn validate_collection_name(name: &str) -> Result<(), VectorError> {
    let valid = !name.is_empty()
        && name.len() <= MAX_COLLECTION_NAME
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(VectorError::InvalidCollectionName(name.to_string()))
    }
}

/// Check a batch before it touches storage; returns the shared dimension.
pub(crate) fn batch_dimension(records: &[VideoEmbeddingRecord]) -> Result<Option<usize>, VectorError> {
    let mut dimension = None;
    for record in records {
        if record.video_id.is_empty() {
            return Err(VectorError::InvalidRecord("empty video id".to_string()));
        }
        if record.vector.is_empty() {
            return Err(VectorError::InvalidRecord(format!(
                "empty vector for {}",
                record.video_id
            )));
        }
        if record.vector.iter().any(|v| !v.is_finite()) {
            return Err(VectorError::InvalidRecord(format!(
                "non-finite value in vector for {}",
                record.video_id
            )));
        }
        if record.vector.iter().all(|v| *v == 0.0) {
            return Err(VectorError::InvalidRecord(format!(
                "zero vector for {}",
                record.video_id
            )));
        }
        match dimension {
            None => dimension = Some(record.dimension()),
            Some(expected) if expected != record.dimension() => {
                return Err(VectorError::DimensionMismatch {
                    expected,
                    actual: record.dimension(),
                })
            }
            Some(_) => {}
        }
    }
    Ok(dimension)
}
