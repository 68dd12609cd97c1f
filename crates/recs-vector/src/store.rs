//! Persistent vector store: usearch HNSW index + RocksDB metadata.
//!
//! Layout under the store root:
//! - `meta/` RocksDB database shared by all collections
//! - `collections/<name>.usearch` one HNSW index file per collection
//!
//! Vectors are kept in RocksDB too, so a missing or stale index file is
//! rebuilt when the collection is opened.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use recs_embeddings::Embedding;
use recs_types::{HnswSettings, VideoEmbeddingRecord};

use crate::collection::{batch_dimension, validate_collection_name, Collection, QueryMatch, VectorStore};
use crate::error::VectorError;
use crate::hnsw::{HnswConfig, HnswIndex};
use crate::metadata::{CollectionInfo, RecordMetadata, StoredRecord};

/// Configuration of an [`HnswStore`].
#[derive(Debug, Clone)]
pub struct HnswStoreConfig {
    /// Store root directory
    pub root: PathBuf,
    pub connectivity: usize,
    pub expansion_add: usize,
    pub expansion_search: usize,
    /// Initial per-collection capacity
    pub capacity: usize,
}

impl HnswStoreConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::from_settings(root, &HnswSettings::default())
    }

    pub fn from_settings(root: impl Into<PathBuf>, settings: &HnswSettings) -> Self {
        Self {
            root: root.into(),
            connectivity: settings.connectivity,
            expansion_add: settings.expansion_add,
            expansion_search: settings.expansion_search,
            capacity: settings.capacity,
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    fn index_file(&self, collection: &str) -> PathBuf {
        self.root
            .join("collections")
            .join(format!("{}.usearch", collection))
    }

    fn hnsw_config(&self, collection: &str, dimension: usize) -> HnswConfig {
        HnswConfig::new(dimension, self.index_file(collection))
            .with_connectivity(self.connectivity)
            .with_expansion(self.expansion_add, self.expansion_search)
            .with_capacity(self.capacity)
    }
}

struct HnswState {
    info: CollectionInfo,
    /// None until the first upsert fixes the dimension
    index: Option<HnswIndex>,
}

/// Synchronous side of a collection. Every call does RocksDB or index file
/// I/O, so the async handle runs it on the blocking pool.
struct CollectionCore {
    name: String,
    meta: Arc<RecordMetadata>,
    config: HnswStoreConfig,
    dropped: AtomicBool,
    state: RwLock<HnswState>,
}

impl CollectionCore {
    fn open(
        name: &str,
        meta: Arc<RecordMetadata>,
        config: HnswStoreConfig,
    ) -> Result<Self, VectorError> {
        let info = match meta.get_collection(name)? {
            Some(info) => info,
            None => {
                let info = CollectionInfo::new(name);
                meta.put_collection(&info)?;
                info!(collection = %name, "Created collection");
                info
            }
        };

        let index = match info.dimension {
            Some(dimension) => Some(load_index(&meta, name, config.hnsw_config(name, dimension))?),
            None => None,
        };

        Ok(Self {
            name: name.to_string(),
            meta,
            config,
            dropped: AtomicBool::new(false),
            state: RwLock::new(HnswState { info, index }),
        })
    }

    fn read_state(&self) -> Result<RwLockReadGuard<'_, HnswState>, VectorError> {
        let state = self
            .state
            .read()
            .map_err(|_| VectorError::Poisoned(format!("collection {}", self.name)))?;
        self.ensure_live()?;
        Ok(state)
    }

    fn write_state(&self) -> Result<RwLockWriteGuard<'_, HnswState>, VectorError> {
        let state = self
            .state
            .write()
            .map_err(|_| VectorError::Poisoned(format!("collection {}", self.name)))?;
        self.ensure_live()?;
        Ok(state)
    }

    fn ensure_live(&self) -> Result<(), VectorError> {
        if self.dropped.load(Ordering::Acquire) {
            return Err(VectorError::CollectionDropped(self.name.clone()));
        }
        Ok(())
    }

    /// Mark the handle dead once no call is in flight.
    fn mark_dropped(&self) -> Result<(), VectorError> {
        let _guard = self
            .state
            .write()
            .map_err(|_| VectorError::Poisoned(format!("collection {}", self.name)))?;
        self.dropped.store(true, Ordering::Release);
        Ok(())
    }

    fn upsert(&self, records: Vec<VideoEmbeddingRecord>) -> Result<(), VectorError> {
        let Some(dimension) = batch_dimension(&records)? else {
            return Ok(());
        };

        let mut guard = self.write_state()?;
        let state = &mut *guard;

        match state.info.dimension {
            Some(expected) if expected != dimension => {
                return Err(VectorError::DimensionMismatch {
                    expected,
                    actual: dimension,
                })
            }
            _ => {}
        }
        if state.index.is_none() {
            let index = HnswIndex::create_empty(self.config.hnsw_config(&self.name, dimension))?;
            state.info.dimension = Some(dimension);
            state.index = Some(index);
        }

        // Keys are allocated and persisted before any vector is written so a
        // crash mid-batch never hands the same key out twice.
        let mut keyed: Vec<(u64, VideoEmbeddingRecord)> = Vec::with_capacity(records.len());
        for record in records {
            let stored = self
                .meta
                .get_record(&self.name, &record.video_id)?
                .map(|existing| existing.key);
            let earlier = keyed
                .iter()
                .find_map(|(key, r)| (r.video_id == record.video_id).then_some(*key));
            let key = stored
                .or(earlier)
                .unwrap_or_else(|| state.info.allocate_key());
            keyed.push((key, record));
        }
        self.meta.put_collection(&state.info)?;

        let Some(index) = state.index.as_ref() else {
            return Err(VectorError::Index("index missing after creation".to_string()));
        };
        let now = Utc::now().timestamp_millis();
        let count = keyed.len();
        for (key, record) in keyed {
            index.upsert(key, &record.vector)?;
            self.meta.put_record(
                &self.name,
                &StoredRecord {
                    key,
                    video_id: record.video_id,
                    vector: record.vector,
                    metadata: record.metadata,
                    updated_at: now,
                },
            )?;
        }
        index.save()?;

        debug!(collection = %self.name, count, "Upserted records");
        Ok(())
    }

    fn delete(&self, ids: &[String]) -> Result<(), VectorError> {
        let state = self.write_state()?;

        let mut removed = 0usize;
        for id in ids {
            if let Some(record) = self.meta.get_record(&self.name, id)? {
                if let Some(index) = state.index.as_ref() {
                    index.remove(record.key)?;
                }
                self.meta.delete_record(&self.name, &record)?;
                removed += 1;
            }
        }

        if removed > 0 {
            if let Some(index) = state.index.as_ref() {
                index.save()?;
            }
        }

        debug!(collection = %self.name, requested = ids.len(), removed, "Deleted records");
        Ok(())
    }

    fn query(
        &self,
        query_embeddings: &[Embedding],
        n_results: usize,
    ) -> Result<Vec<Vec<QueryMatch>>, VectorError> {
        let state = self.read_state()?;

        let Some(index) = state.index.as_ref() else {
            return Ok(vec![Vec::new(); query_embeddings.len()]);
        };

        let mut results = Vec::with_capacity(query_embeddings.len());
        for query in query_embeddings {
            let hits = index.search(query.as_slice(), n_results)?;

            let mut matches = Vec::with_capacity(hits.len());
            for (key, score) in hits {
                match self.meta.get_record_by_key(&self.name, key)? {
                    Some(record) => matches.push(QueryMatch {
                        video_id: record.video_id,
                        score,
                        metadata: record.metadata,
                    }),
                    None => warn!(collection = %self.name, key, "Index key without metadata"),
                }
            }
            results.push(matches);
        }

        Ok(results)
    }

    fn count(&self) -> Result<usize, VectorError> {
        let _state = self.read_state()?;
        self.meta.count_records(&self.name)
    }
}

/// Open the index file, rebuilding it from stored vectors when it is
/// missing, unreadable or out of sync with the metadata.
fn load_index(
    meta: &RecordMetadata,
    collection: &str,
    config: HnswConfig,
) -> Result<HnswIndex, VectorError> {
    let records = meta.records(collection)?;

    if config.index_file.exists() {
        match HnswIndex::open_or_create(config.clone()) {
            Ok(index) => {
                let indexed = index.len()?;
                if indexed == records.len() && holds_all_keys(&index, &records)? {
                    return Ok(index);
                }
                warn!(
                    collection,
                    indexed,
                    stored = records.len(),
                    "Vector index out of sync, rebuilding"
                );
            }
            Err(e) => warn!(collection, error = %e, "Vector index unreadable, rebuilding"),
        }
    }

    let capacity = config.capacity.max(records.len());
    let index = HnswIndex::create_empty(config.with_capacity(capacity))?;
    for record in &records {
        index.upsert(record.key, &record.vector)?;
    }
    index.save()?;

    info!(collection, vectors = records.len(), "Rebuilt vector index");
    Ok(index)
}

fn holds_all_keys(index: &HnswIndex, records: &[StoredRecord]) -> Result<bool, VectorError> {
    for record in records {
        if !index.contains(record.key)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// A collection of the persistent store.
pub struct HnswCollection {
    core: Arc<CollectionCore>,
}

impl HnswCollection {
    /// Run a synchronous collection call on the blocking pool.
    async fn blocking<T, F>(&self, f: F) -> Result<T, VectorError>
    where
        F: FnOnce(&CollectionCore) -> Result<T, VectorError> + Send + 'static,
        T: Send + 'static,
    {
        let core = Arc::clone(&self.core);
        tokio::task::spawn_blocking(move || f(&core)).await?
    }
}

#[async_trait]
impl Collection for HnswCollection {
    fn name(&self) -> &str {
        &self.core.name
    }

    async fn upsert(&self, records: Vec<VideoEmbeddingRecord>) -> Result<(), VectorError> {
        self.blocking(move |core| core.upsert(records)).await
    }

    async fn delete(&self, ids: &[String]) -> Result<(), VectorError> {
        let ids = ids.to_vec();
        self.blocking(move |core| core.delete(&ids)).await
    }

    async fn query(
        &self,
        query_embeddings: &[Embedding],
        n_results: usize,
    ) -> Result<Vec<Vec<QueryMatch>>, VectorError> {
        let queries = query_embeddings.to_vec();
        self.blocking(move |core| core.query(&queries, n_results)).await
    }

    async fn count(&self) -> Result<usize, VectorError> {
        self.blocking(|core| core.count()).await
    }

    async fn dimension(&self) -> Result<Option<usize>, VectorError> {
        Ok(self.core.read_state()?.info.dimension)
    }
}

struct StoreCore {
    config: HnswStoreConfig,
    meta: Arc<RecordMetadata>,
    open: Mutex<HashMap<String, Arc<CollectionCore>>>,
}

impl StoreCore {
    fn open_collections(
        &self,
    ) -> Result<MutexGuard<'_, HashMap<String, Arc<CollectionCore>>>, VectorError> {
        self.open
            .lock()
            .map_err(|_| VectorError::Poisoned("vector store".to_string()))
    }

    fn get_or_create_collection(&self, name: &str) -> Result<Arc<CollectionCore>, VectorError> {
        validate_collection_name(name)?;
        let mut open = self.open_collections()?;

        if let Some(core) = open.get(name) {
            return Ok(Arc::clone(core));
        }

        let core = Arc::new(CollectionCore::open(
            name,
            Arc::clone(&self.meta),
            self.config.clone(),
        )?);
        open.insert(name.to_string(), Arc::clone(&core));
        Ok(core)
    }

    fn delete_collection(&self, name: &str) -> Result<(), VectorError> {
        validate_collection_name(name)?;
        let mut open = self.open_collections()?;

        if let Some(core) = open.remove(name) {
            core.mark_dropped()?;
        }

        let removed = self.meta.drop_collection(name)?;
        match std::fs::remove_file(self.config.index_file(name)) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        info!(collection = %name, removed, "Deleted collection");
        Ok(())
    }
}

/// Persistent vector store rooted at a directory.
pub struct HnswStore {
    core: Arc<StoreCore>,
}

impl HnswStore {
    /// Open or create the store at `config.root`.
    pub fn open(config: HnswStoreConfig) -> Result<Self, VectorError> {
        std::fs::create_dir_all(config.root.join("collections"))?;
        let meta = Arc::new(RecordMetadata::open(config.root.join("meta"))?);

        info!(root = ?config.root, "Opened vector store");
        Ok(Self {
            core: Arc::new(StoreCore {
                config,
                meta,
                open: Mutex::new(HashMap::new()),
            }),
        })
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, VectorError>
    where
        F: FnOnce(&StoreCore) -> Result<T, VectorError> + Send + 'static,
        T: Send + 'static,
    {
        let core = Arc::clone(&self.core);
        tokio::task::spawn_blocking(move || f(&core)).await?
    }
}

#[async_trait]
impl VectorStore for HnswStore {
    async fn get_or_create_collection(
        &self,
        name: &str,
    ) -> Result<Arc<dyn Collection>, VectorError> {
        let name = name.to_string();
        let core = self
            .blocking(move |store| store.get_or_create_collection(&name))
            .await?;
        Ok(Arc::new(HnswCollection { core }))
    }

    async fn delete_collection(&self, name: &str) -> Result<(), VectorError> {
        let name = name.to_string();
        self.blocking(move |store| store.delete_collection(&name)).await
    }

    async fn list_collections(&self) -> Result<Vec<String>, VectorError> {
        self.blocking(|store| store.meta.list_collections()).await
    }
}
