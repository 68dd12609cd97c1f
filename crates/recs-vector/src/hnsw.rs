//! HNSW index over u64 keys, backed by usearch.
//!
//! One index file per collection. Default parameters favour recall:
//! - M = 16 (connections per layer)
//! - ef_construction = 200 (build-time quality)
//! - ef_search = 100 (search-time quality)

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use tracing::{debug, info};
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

use crate::error::VectorError;

/// HNSW index configuration
#[derive(Debug, Clone)]
pub struct HnswConfig {
    /// Vector dimension
    pub dimension: usize,
    /// Number of connections per layer (M parameter)
    pub connectivity: usize,
    /// Build-time search depth (ef_construction)
    pub expansion_add: usize,
    /// Query-time search depth (ef_search)
    pub expansion_search: usize,
    /// Index file path
    pub index_file: PathBuf,
    /// Initial capacity; grows by doubling when full
    pub capacity: usize,
}

impl HnswConfig {
    pub fn new(dimension: usize, index_file: impl Into<PathBuf>) -> Self {
        Self {
            dimension,
            connectivity: 16,
            expansion_add: 200,
            expansion_search: 100,
            index_file: index_file.into(),
            capacity: 1_000,
        }
    }

    pub fn with_connectivity(mut self, m: usize) -> Self {
        self.connectivity = m;
        self
    }

    pub fn with_expansion(mut self, ef_add: usize, ef_search: usize) -> Self {
        self.expansion_add = ef_add;
        self.expansion_search = ef_search;
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    fn options(&self) -> IndexOptions {
        IndexOptions {
            dimensions: self.dimension,
            metric: MetricKind::Cos,
            quantization: ScalarKind::F32,
            connectivity: self.connectivity,
            expansion_add: self.expansion_add,
            expansion_search: self.expansion_search,
            multi: false, // one vector per key
        }
    }
}

/// usearch HNSW index guarded for shared use.
pub struct HnswIndex {
    index: RwLock<Index>,
    config: HnswConfig,
}

impl HnswIndex {
    /// Open the index file if it exists, otherwise create an empty index.
    pub fn open_or_create(config: HnswConfig) -> Result<Self, VectorError> {
        let index = Index::new(&config.options()).map_err(|e| VectorError::Index(e.to_string()))?;

        if config.index_file.exists() {
            info!(path = ?config.index_file, "Opening existing vector index");
            index
                .load(path_str(&config.index_file)?)
                .map_err(|e| VectorError::Index(format!("Failed to load: {}", e)))?;
        } else {
            info!(path = ?config.index_file, dim = config.dimension, "Creating new vector index");
            if let Some(parent) = config.index_file.parent() {
                std::fs::create_dir_all(parent)?;
            }
            index
                .reserve(config.capacity)
                .map_err(|e| VectorError::Index(e.to_string()))?;
        }

        Ok(Self {
            index: RwLock::new(index),
            config,
        })
    }

    /// Create an empty index, ignoring any file on disk.
    pub fn create_empty(config: HnswConfig) -> Result<Self, VectorError> {
        let index = Index::new(&config.options()).map_err(|e| VectorError::Index(e.to_string()))?;
        index
            .reserve(config.capacity)
            .map_err(|e| VectorError::Index(e.to_string()))?;
        Ok(Self {
            index: RwLock::new(index),
            config,
        })
    }

    pub fn dimension(&self) -> usize {
        self.config.dimension
    }

    pub fn len(&self) -> Result<usize, VectorError> {
        Ok(self.read()?.size())
    }

    pub fn is_empty(&self) -> Result<bool, VectorError> {
        Ok(self.len()? == 0)
    }

    /// Insert or replace the vector stored under `key`.
    #[allow(clippy::readonly_write_lock)] // usearch::Index uses interior mutability
    pub fn upsert(&self, key: u64, vector: &[f32]) -> Result<(), VectorError> {
        self.check_dimension(vector.len())?;

        let index = self.write()?;
        if index.contains(key) {
            index
                .remove(key)
                .map_err(|e| VectorError::Index(e.to_string()))?;
        }
        if index.size() >= index.capacity() {
            let grown = (index.capacity() * 2).max(self.config.capacity);
            index
                .reserve(grown)
                .map_err(|e| VectorError::Index(e.to_string()))?;
            debug!(capacity = grown, "Grew vector index");
        }
        index
            .add(key, vector)
            .map_err(|e| VectorError::Index(e.to_string()))?;

        debug!(key, "Upserted vector");
        Ok(())
    }

    /// k nearest neighbors as `(key, cosine similarity)`, best first.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(u64, f32)>, VectorError> {
        self.check_dimension(query.len())?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let index = self.read()?;
        if index.size() == 0 {
            return Ok(Vec::new());
        }
        let results = index
            .search(query, k)
            .map_err(|e| VectorError::Index(e.to_string()))?;

        // usearch reports cosine distance; 1 - distance is the similarity.
        let hits: Vec<(u64, f32)> = results
            .keys
            .iter()
            .zip(results.distances.iter())
            .map(|(&key, &dist)| (key, 1.0 - dist))
            .collect();

        debug!(k, found = hits.len(), "Search complete");
        Ok(hits)
    }

    /// Remove a key; returns whether it was present.
    #[allow(clippy::readonly_write_lock)] // usearch::Index uses interior mutability
    pub fn remove(&self, key: u64) -> Result<bool, VectorError> {
        let index = self.write()?;
        let removed = index
            .remove(key)
            .map_err(|e| VectorError::Index(e.to_string()))?;
        Ok(removed > 0)
    }

    pub fn contains(&self, key: u64) -> Result<bool, VectorError> {
        Ok(self.read()?.contains(key))
    }

    /// Persist the index to its file.
    pub fn save(&self) -> Result<(), VectorError> {
        let index = self.read()?;
        index
            .save(path_str(&self.config.index_file)?)
            .map_err(|e| VectorError::Index(format!("Failed to save: {}", e)))?;
        debug!(path = ?self.config.index_file, vectors = index.size(), "Saved vector index");
        Ok(())
    }

    fn check_dimension(&self, actual: usize) -> Result<(), VectorError> {
        if actual != self.config.dimension {
            return Err(VectorError::DimensionMismatch {
                expected: self.config.dimension,
                actual,
            });
        }
        Ok(())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Index>, VectorError> {
        self.index
            .read()
            .map_err(|e| VectorError::Poisoned(format!("hnsw index: {}", e)))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Index>, VectorError> {
        self.index
            .write()
            .map_err(|e| VectorError::Poisoned(format!("hnsw index: {}", e)))
    }
}

fn path_str(path: &Path) -> Result<&str, VectorError> {
    path.to_str()
        .ok_or_else(|| VectorError::Index("Invalid path encoding".to_string()))
}
