//! In-process vector store with exact cosine search.
//!
//! Nothing is persisted. Used for tests and for small catalogs where a
//! linear scan is cheaper than maintaining an HNSW graph.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use recs_embeddings::Embedding;
use recs_types::VideoEmbeddingRecord;
use tracing::{debug, info};

use crate::collection::{batch_dimension, validate_collection_name, Collection, QueryMatch, VectorStore};
use crate::error::VectorError;

#[derive(Default)]
struct MemoryState {
    dimension: Option<usize>,
    records: HashMap<String, VideoEmbeddingRecord>,
}

/// A collection held entirely in memory.
pub struct MemoryCollection {
    name: String,
    dropped: AtomicBool,
    state: RwLock<MemoryState>,
}

impl MemoryCollection {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            dropped: AtomicBool::new(false),
            state: RwLock::new(MemoryState::default()),
        }
    }

    fn ensure_live(&self) -> Result<(), VectorError> {
        if self.dropped.load(Ordering::Acquire) {
            return Err(VectorError::CollectionDropped(self.name.clone()));
        }
        Ok(())
    }

    fn poisoned(&self) -> VectorError {
        VectorError::Poisoned(format!("memory collection {}", self.name))
    }
}

#[async_trait]
impl Collection for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn upsert(&self, records: Vec<VideoEmbeddingRecord>) -> Result<(), VectorError> {
        self.ensure_live()?;
        let Some(dimension) = batch_dimension(&records)? else {
            return Ok(());
        };

        let mut state = self.state.write().map_err(|_| self.poisoned())?;
        match state.dimension {
            Some(expected) if expected != dimension => {
                return Err(VectorError::DimensionMismatch {
                    expected,
                    actual: dimension,
                })
            }
            Some(_) => {}
            None => state.dimension = Some(dimension),
        }

        let count = records.len();
        for record in records {
            state.records.insert(record.video_id.clone(), record);
        }

        debug!(collection = %self.name, count, "Upserted records");
        Ok(())
    }

    async fn delete(&self, ids: &[String]) -> Result<(), VectorError> {
        self.ensure_live()?;
        let mut state = self.state.write().map_err(|_| self.poisoned())?;
        let removed = ids
            .iter()
            .filter(|id| state.records.remove(id.as_str()).is_some())
            .count();
        debug!(collection = %self.name, requested = ids.len(), removed, "Deleted records");
        Ok(())
    }

    async fn query(
        &self,
        query_embeddings: &[Embedding],
        n_results: usize,
    ) -> Result<Vec<Vec<QueryMatch>>, VectorError> {
        self.ensure_live()?;
        let state = self.state.read().map_err(|_| self.poisoned())?;

        let mut results = Vec::with_capacity(query_embeddings.len());
        for query in query_embeddings {
            if let Some(expected) = state.dimension {
                if query.dimension() != expected {
                    return Err(VectorError::DimensionMismatch {
                        expected,
                        actual: query.dimension(),
                    });
                }
            }

            let mut matches: Vec<QueryMatch> = state
                .records
                .values()
                .map(|record| QueryMatch {
                    video_id: record.video_id.clone(),
                    score: cosine(query.as_slice(), &record.vector),
                    metadata: record.metadata.clone(),
                })
                .collect();

            // Ties broken by id so results are stable across runs.
            matches.sort_by(|a, b| {
                b.score
                    .total_cmp(&a.score)
                    .then_with(|| a.video_id.cmp(&b.video_id))
            });
            matches.truncate(n_results);
            results.push(matches);
        }

        Ok(results)
    }

    async fn count(&self) -> Result<usize, VectorError> {
        self.ensure_live()?;
        Ok(self.state.read().map_err(|_| self.poisoned())?.records.len())
    }

    async fn dimension(&self) -> Result<Option<usize>, VectorError> {
        self.ensure_live()?;
        Ok(self.state.read().map_err(|_| self.poisoned())?.dimension)
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Vector store keeping every collection in memory.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Arc<MemoryCollection>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn get_or_create_collection(
        &self,
        name: &str,
    ) -> Result<Arc<dyn Collection>, VectorError> {
        validate_collection_name(name)?;
        let mut collections = self
            .collections
            .write()
            .map_err(|_| VectorError::Poisoned("memory store".to_string()))?;

        let collection = collections
            .entry(name.to_string())
            .or_insert_with(|| {
                info!(collection = %name, "Created in-memory collection");
                Arc::new(MemoryCollection::new(name))
            })
            .clone();
        Ok(collection)
    }

    async fn delete_collection(&self, name: &str) -> Result<(), VectorError> {
        validate_collection_name(name)?;
        let removed = self
            .collections
            .write()
            .map_err(|_| VectorError::Poisoned("memory store".to_string()))?
            .remove(name);

        if let Some(collection) = removed {
            // Take the write lock so no in-flight call straddles the drop.
            let _guard = collection.state.write().map_err(|_| collection.poisoned())?;
            collection.dropped.store(true, Ordering::Release);
            info!(collection = %name, "Deleted in-memory collection");
        }
        Ok(())
    }

    async fn list_collections(&self) -> Result<Vec<String>, VectorError> {
        let mut names: Vec<String> = self
            .collections
            .read()
            .map_err(|_| VectorError::Poisoned("memory store".to_string()))?
            .keys()
            .cloned()
            .collect();
        names.sort();
        Ok(names)
    }
}
