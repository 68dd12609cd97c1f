//! End-to-end engine behavior against the in-memory and HNSW stores.

use std::error::Error as _;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use recs_embeddings::{Embedding, EmbeddingError, EmbeddingModel, HashingEmbedder, LazyEmbedder, ModelInfo};
use recs_engine::{EngineConfig, EngineError, EngineState, IndexingStats, RecommendationEngine};
use recs_types::{VideoDocument, VideoEmbeddingRecord};
use recs_vector::{
    Collection, HnswStore, HnswStoreConfig, MemoryStore, QueryMatch, VectorError, VectorStore,
};
use tempfile::TempDir;

const DIM: usize = 128;

fn hashing_embedder() -> Arc<LazyEmbedder<HashingEmbedder>> {
    Arc::new(LazyEmbedder::new(|| HashingEmbedder::new(DIM)))
}

fn engine_with(store: Arc<dyn VectorStore>) -> RecommendationEngine<HashingEmbedder> {
    RecommendationEngine::new(hashing_embedder(), store, EngineConfig::default())
}

async fn ready_engine() -> RecommendationEngine<HashingEmbedder> {
    let engine = engine_with(Arc::new(MemoryStore::new()));
    engine.initialize().await.unwrap();
    engine
}

fn tags(values: &[&str]) -> Vec<String> {
    values.iter().map(|t| t.to_string()).collect()
}

async fn add_catalog(engine: &RecommendationEngine<HashingEmbedder>) {
    engine
        .add_or_update_video("v1", "Cats", "Videos about cats", &tags(&["pets", "cats"]))
        .await
        .unwrap();
    engine
        .add_or_update_video("v2", "Pasta night", "Cooking fresh pasta at home", &tags(&["food"]))
        .await
        .unwrap();
    engine
        .add_or_update_video("v3", "Engine repair", "Fixing a diesel truck", &tags(&["mechanics"]))
        .await
        .unwrap();
}

fn io_error(what: &str) -> VectorError {
    VectorError::Io(std::io::Error::new(std::io::ErrorKind::Other, what.to_string()))
}

/// Failure switches shared by a [`FlakyStore`] and every collection it hands out.
#[derive(Default)]
struct CollectionFaults {
    fail_writes: AtomicBool,
    fail_queries: AtomicBool,
    /// 1-based upsert call that fails; 0 never fails
    fail_upsert_at: AtomicUsize,
    upserts: AtomicUsize,
}

/// Store wrapper that can be told to fail creation, deletion, or any
/// operation on its collections.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    fail_create: AtomicBool,
    fail_delete: AtomicBool,
    faults: Arc<CollectionFaults>,
}

#[async_trait]
impl VectorStore for FlakyStore {
    async fn get_or_create_collection(&self, name: &str) -> Result<Arc<dyn Collection>, VectorError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(io_error("create refused"));
        }
        let inner = self.inner.get_or_create_collection(name).await?;
        Ok(Arc::new(FlakyCollection {
            inner,
            faults: Arc::clone(&self.faults),
        }))
    }

    async fn delete_collection(&self, name: &str) -> Result<(), VectorError> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(io_error("delete refused"));
        }
        self.inner.delete_collection(name).await
    }

    async fn list_collections(&self) -> Result<Vec<String>, VectorError> {
        self.inner.list_collections().await
    }
}

struct FlakyCollection {
    inner: Arc<dyn Collection>,
    faults: Arc<CollectionFaults>,
}

#[async_trait]
impl Collection for FlakyCollection {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn upsert(&self, records: Vec<VideoEmbeddingRecord>) -> Result<(), VectorError> {
        let call = self.faults.upserts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.faults.fail_writes.load(Ordering::SeqCst)
            || self.faults.fail_upsert_at.load(Ordering::SeqCst) == call
        {
            return Err(io_error("write refused"));
        }
        self.inner.upsert(records).await
    }

    async fn delete(&self, ids: &[String]) -> Result<(), VectorError> {
        if self.faults.fail_writes.load(Ordering::SeqCst) {
            return Err(io_error("write refused"));
        }
        self.inner.delete(ids).await
    }

    async fn query(
        &self,
        query_embeddings: &[Embedding],
        n_results: usize,
    ) -> Result<Vec<Vec<QueryMatch>>, VectorError> {
        if self.faults.fail_queries.load(Ordering::SeqCst) {
            return Err(io_error("query refused"));
        }
        self.inner.query(query_embeddings, n_results).await
    }

    async fn count(&self) -> Result<usize, VectorError> {
        self.inner.count().await
    }

    async fn dimension(&self) -> Result<Option<usize>, VectorError> {
        self.inner.dimension().await
    }
}

/// Hashing embedder that fails every call while `fail` is set.
struct SwitchableEmbedder {
    inner: HashingEmbedder,
    fail: Arc<AtomicBool>,
}

impl EmbeddingModel for SwitchableEmbedder {
    fn info(&self) -> &ModelInfo {
        self.inner.info()
    }

    fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(EmbeddingError::InvalidInput("model exploded".to_string()));
        }
        self.inner.embed(text)
    }
}

async fn switchable_engine() -> (RecommendationEngine<SwitchableEmbedder>, Arc<AtomicBool>) {
    let fail = Arc::new(AtomicBool::new(false));
    let embedder = SwitchableEmbedder {
        inner: HashingEmbedder::new(DIM).unwrap(),
        fail: Arc::clone(&fail),
    };
    let engine = RecommendationEngine::new(
        Arc::new(LazyEmbedder::ready(embedder)),
        Arc::new(MemoryStore::new()),
        EngineConfig::default(),
    );
    engine.initialize().await.unwrap();
    (engine, fail)
}

#[tokio::test]
async fn test_generate_embedding_is_unit_length() {
    let engine = ready_engine().await;

    let embedding = engine.generate_embedding("a video about sailing").await.unwrap();
    assert_eq!(embedding.dimension(), DIM);
    assert!((embedding.norm() - 1.0).abs() < 1e-4);

    let again = engine.generate_embedding("a video about sailing").await.unwrap();
    assert_eq!(embedding, again);
}

#[tokio::test]
async fn test_cats_example() {
    let engine = ready_engine().await;
    add_catalog(&engine).await;

    let ids = engine.get_recommendations("cute cat", 5).await.unwrap();
    assert!(ids.contains(&"v1".to_string()));
}

#[tokio::test]
async fn test_same_text_ranks_first() {
    let engine = ready_engine().await;
    add_catalog(&engine).await;

    let text = VideoDocument::new("q", "Pasta night", "Cooking fresh pasta at home", tags(&["food"]))
        .embedding_text();
    let recs = engine.get_scored_recommendations(&text, 3).await.unwrap();

    assert_eq!(recs.len(), 3);
    assert_eq!(recs[0].video_id, "v2");
    assert_eq!(recs[0].title, "Pasta night");
    assert!(recs[0].score > 0.99);
    for pair in recs.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

#[tokio::test]
async fn test_update_replaces_record() {
    let engine = ready_engine().await;
    engine
        .add_or_update_video("v1", "Cats", "Videos about cats", &tags(&["pets"]))
        .await
        .unwrap();
    engine
        .add_or_update_video("v1", "Dogs", "Videos about dogs", &tags(&["pets"]))
        .await
        .unwrap();

    assert_eq!(engine.stats().await.unwrap().record_count, 1);

    let recs = engine.get_scored_recommendations("dogs", 5).await.unwrap();
    assert_eq!(recs.len(), 1);
    assert_eq!(recs[0].title, "Dogs");
}

#[tokio::test]
async fn test_delete_video() {
    let engine = ready_engine().await;
    add_catalog(&engine).await;

    engine.delete_video("v1").await.unwrap();
    engine.delete_video("never-added").await.unwrap();

    let ids = engine.get_recommendations("cute cat", 10).await.unwrap();
    assert!(!ids.contains(&"v1".to_string()));
    assert_eq!(ids.len(), 2);
}

#[tokio::test]
async fn test_clear_collection_empties_results() {
    let engine = ready_engine().await;
    add_catalog(&engine).await;

    engine.clear_collection().await.unwrap();

    assert!(engine.get_recommendations("cute cat", 5).await.unwrap().is_empty());
    let stats = engine.stats().await.unwrap();
    assert_eq!(stats.record_count, 0);
    assert_eq!(stats.dimension, None);
    assert_eq!(engine.state(), EngineState::Ready);

    // The collection is usable again after a clear.
    add_catalog(&engine).await;
    assert_eq!(engine.stats().await.unwrap().record_count, 3);
}

#[tokio::test]
async fn test_limits() {
    let engine = ready_engine().await;
    add_catalog(&engine).await;

    assert!(matches!(
        engine.get_recommendations("cats", 0).await,
        Err(EngineError::InvalidLimit)
    ));

    // Fewer videos than requested: return what exists.
    assert_eq!(engine.get_recommendations("cats", 50).await.unwrap().len(), 3);
    assert_eq!(engine.get_recommendations("cats", 1).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_limit_is_clamped() {
    let engine = RecommendationEngine::new(
        hashing_embedder(),
        Arc::new(MemoryStore::new()),
        EngineConfig {
            max_limit: 2,
            ..EngineConfig::default()
        },
    );
    engine.initialize().await.unwrap();
    add_catalog(&engine).await;

    assert_eq!(engine.get_recommendations("cats", 10).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_operations_before_initialize() {
    let engine = engine_with(Arc::new(MemoryStore::new()));

    assert!(matches!(
        engine.generate_embedding("x").await,
        Err(EngineError::NotInitialized)
    ));
    assert!(matches!(
        engine.add_or_update_video("v1", "t", "d", &[]).await,
        Err(EngineError::CollectionNotInitialized)
    ));
    assert!(matches!(
        engine.delete_video("v1").await,
        Err(EngineError::CollectionNotInitialized)
    ));
    assert!(matches!(
        engine.get_recommendations("x", 5).await,
        Err(EngineError::CollectionNotInitialized)
    ));
    assert!(matches!(
        engine.clear_collection().await,
        Err(EngineError::CollectionNotInitialized)
    ));
    assert!(matches!(
        engine.stats().await,
        Err(EngineError::CollectionNotInitialized)
    ));
}

#[tokio::test]
async fn test_failed_initialize_can_be_retried() {
    let store = Arc::new(FlakyStore::default());
    store.fail_create.store(true, Ordering::SeqCst);
    let engine = engine_with(store.clone());

    let err = engine.initialize().await.unwrap_err();
    assert!(matches!(err, EngineError::Initialization(_)));
    assert!(err.is_retryable());
    assert_eq!(engine.state(), EngineState::Uninitialized);

    store.fail_create.store(false, Ordering::SeqCst);
    engine.initialize().await.unwrap();
    assert_eq!(engine.state(), EngineState::Ready);
}

#[tokio::test]
async fn test_embedder_load_failure() {
    let embedder = Arc::new(LazyEmbedder::new(|| {
        Err::<HashingEmbedder, _>(EmbeddingError::ModelNotFound("no weights".to_string()))
    }));
    let engine = RecommendationEngine::new(embedder, Arc::new(MemoryStore::new()), EngineConfig::default());

    let err = engine.initialize().await.unwrap_err();
    assert!(matches!(err, EngineError::Initialization(_)));
    assert!(!err.is_retryable());
    assert_eq!(engine.state(), EngineState::Uninitialized);

    // The half-acquired collection handle is released.
    assert!(matches!(
        engine.stats().await,
        Err(EngineError::CollectionNotInitialized)
    ));
}

#[tokio::test]
async fn test_clear_failures() {
    let store = Arc::new(FlakyStore::default());
    let engine = engine_with(store.clone());
    engine.initialize().await.unwrap();
    add_catalog(&engine).await;

    // Delete fails: nothing changes.
    store.fail_delete.store(true, Ordering::SeqCst);
    assert!(matches!(engine.clear_collection().await, Err(EngineError::Clear(_))));
    assert_eq!(engine.stats().await.unwrap().record_count, 3);
    store.fail_delete.store(false, Ordering::SeqCst);

    // Delete succeeds, recreate fails: the handle is gone.
    store.fail_create.store(true, Ordering::SeqCst);
    assert!(matches!(engine.clear_collection().await, Err(EngineError::Clear(_))));
    assert!(matches!(
        engine.get_recommendations("cats", 5).await,
        Err(EngineError::CollectionNotInitialized)
    ));
    assert!(matches!(
        engine.add_or_update_video("v9", "t", "d", &[]).await,
        Err(EngineError::CollectionNotInitialized)
    ));
    assert_eq!(engine.state(), EngineState::Ready);

    // A later clear restores it.
    store.fail_create.store(false, Ordering::SeqCst);
    engine.clear_collection().await.unwrap();
    assert!(engine.get_recommendations("cats", 5).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_failure_keeps_cause() {
    let store = Arc::new(FlakyStore::default());
    let engine = engine_with(store.clone());
    engine.initialize().await.unwrap();
    add_catalog(&engine).await;

    store.faults.fail_writes.store(true, Ordering::SeqCst);
    let err = engine.delete_video("v1").await.unwrap_err();
    assert!(matches!(&err, EngineError::Delete { video_id, .. } if video_id == "v1"));
    assert_eq!(err.to_string(), "Failed to delete video v1");
    assert!(err.source().unwrap().to_string().contains("write refused"));
    assert!(err.is_retryable());

    store.faults.fail_writes.store(false, Ordering::SeqCst);
    assert_eq!(engine.stats().await.unwrap().record_count, 3);
}

#[tokio::test]
async fn test_query_failure_from_store() {
    let store = Arc::new(FlakyStore::default());
    let engine = engine_with(store.clone());
    engine.initialize().await.unwrap();
    add_catalog(&engine).await;

    store.faults.fail_queries.store(true, Ordering::SeqCst);
    let err = engine.get_recommendations("cute cat", 5).await.unwrap_err();
    assert!(matches!(err, EngineError::Query(_)));
    assert_eq!(err.to_string(), "Failed to get recommendations");
    assert!(err.source().unwrap().to_string().contains("query refused"));
    assert!(err.is_retryable());

    store.faults.fail_queries.store(false, Ordering::SeqCst);
    assert!(engine.get_recommendations("cute cat", 5).await.is_ok());
}

#[tokio::test]
async fn test_embedding_failures() {
    let (engine, fail) = switchable_engine().await;
    engine
        .add_or_update_video("v1", "Cats", "Videos about cats", &tags(&["pets"]))
        .await
        .unwrap();

    fail.store(true, Ordering::SeqCst);

    let err = engine.generate_embedding("cute cat").await.unwrap_err();
    assert!(matches!(err, EngineError::Embedding(_)));
    assert_eq!(err.to_string(), "Failed to generate embedding");
    assert_eq!(err.source().unwrap().to_string(), "Invalid input: model exploded");
    assert!(!err.is_retryable());

    let err = engine.get_recommendations("cute cat", 5).await.unwrap_err();
    assert!(matches!(err, EngineError::Query(_)));
    assert_eq!(err.to_string(), "Failed to get recommendations");
    assert_eq!(err.source().unwrap().to_string(), "Invalid input: model exploded");

    let err = engine
        .add_or_update_video("v2", "Dogs", "Videos about dogs", &[])
        .await
        .unwrap_err();
    assert!(matches!(&err, EngineError::Upsert { video_id, .. } if video_id == "v2"));
    assert_eq!(engine.stats().await.unwrap().record_count, 1);

    fail.store(false, Ordering::SeqCst);
    assert_eq!(engine.get_recommendations("cute cat", 5).await.unwrap(), vec!["v1".to_string()]);
}

#[tokio::test]
async fn test_index_videos() {
    let engine = ready_engine().await;
    let documents = vec![
        VideoDocument::new("v1", "Cats", "Videos about cats", tags(&["pets"])),
        VideoDocument::new("v2", "", "", vec![]),
        VideoDocument::new("", "No id", "Rejected by the store", vec![]),
        VideoDocument::new("v3", "Dogs", "Videos about dogs", tags(&["pets"])),
    ];

    let stats = engine.index_videos(&documents).await.unwrap();
    assert_eq!(
        stats,
        IndexingStats {
            processed: 4,
            indexed: 2,
            skipped: 1,
            errors: 1,
        }
    );
    assert_eq!(engine.stats().await.unwrap().record_count, 2);

    let empty = engine.index_videos(&[]).await.unwrap();
    assert_eq!(empty, IndexingStats::default());
}

fn numbered_videos(count: usize) -> Vec<VideoDocument> {
    (1..=count)
        .map(|i| {
            VideoDocument::new(
                format!("v{}", i),
                format!("Video {}", i),
                format!("Episode {} of the series", i),
                tags(&["series"]),
            )
        })
        .collect()
}

#[tokio::test]
async fn test_index_videos_stores_one_batch_at_a_time() {
    let store = Arc::new(FlakyStore::default());
    let engine = RecommendationEngine::new(
        hashing_embedder(),
        store.clone(),
        EngineConfig {
            batch_size: 2,
            ..EngineConfig::default()
        },
    );
    engine.initialize().await.unwrap();

    let stats = engine.index_videos(&numbered_videos(5)).await.unwrap();
    assert_eq!(stats.indexed, 5);
    assert_eq!(store.faults.upserts.load(Ordering::SeqCst), 3);
    assert_eq!(engine.stats().await.unwrap().record_count, 5);
}

#[tokio::test]
async fn test_failed_batch_counts_its_videos_as_errors() {
    let store = Arc::new(FlakyStore::default());
    let engine = RecommendationEngine::new(
        hashing_embedder(),
        store.clone(),
        EngineConfig {
            batch_size: 2,
            ..EngineConfig::default()
        },
    );
    engine.initialize().await.unwrap();
    store.faults.fail_upsert_at.store(2, Ordering::SeqCst);

    let stats = engine.index_videos(&numbered_videos(5)).await.unwrap();
    assert_eq!(
        stats,
        IndexingStats {
            processed: 5,
            indexed: 3,
            skipped: 0,
            errors: 2,
        }
    );

    let ids = engine.get_recommendations("series episode", 10).await.unwrap();
    assert_eq!(ids.len(), 3);
    assert!(!ids.contains(&"v3".to_string()));
    assert!(!ids.contains(&"v4".to_string()));
}

#[tokio::test]
async fn test_index_videos_embedding_failure() {
    let (engine, fail) = switchable_engine().await;
    fail.store(true, Ordering::SeqCst);

    let stats = engine.index_videos(&numbered_videos(3)).await.unwrap();
    assert_eq!(stats.processed, 3);
    assert_eq!(stats.errors, 3);
    assert_eq!(engine.stats().await.unwrap().record_count, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writes() {
    let engine = Arc::new(ready_engine().await);

    let mut handles = Vec::new();
    for i in 0..16 {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            let id = format!("v{}", i % 4);
            let title = format!("Title {}", i);
            engine
                .add_or_update_video(&id, &title, "concurrent upsert", &[])
                .await
        }));
    }
    for result in futures::future::join_all(handles).await {
        result.unwrap().unwrap();
    }

    let stats = engine.stats().await.unwrap();
    assert_eq!(stats.record_count, 4);
    assert_eq!(stats.dimension, Some(DIM));
}

#[tokio::test]
async fn test_hnsw_store_persists_across_engines() {
    let temp = TempDir::new().unwrap();
    {
        let store = HnswStore::open(HnswStoreConfig::new(temp.path()).with_capacity(8)).unwrap();
        let engine = engine_with(Arc::new(store));
        engine.initialize().await.unwrap();
        add_catalog(&engine).await;
        engine.delete_video("v3").await.unwrap();
    }

    let store = HnswStore::open(HnswStoreConfig::new(temp.path())).unwrap();
    let engine = engine_with(Arc::new(store));
    engine.initialize().await.unwrap();

    let stats = engine.stats().await.unwrap();
    assert_eq!(stats.name, "videos");
    assert_eq!(stats.record_count, 2);

    let ids = engine.get_recommendations("cute cat", 5).await.unwrap();
    assert!(ids.contains(&"v1".to_string()));
    assert!(!ids.contains(&"v3".to_string()));

    engine.clear_collection().await.unwrap();
    assert!(engine.get_recommendations("cute cat", 5).await.unwrap().is_empty());
}
