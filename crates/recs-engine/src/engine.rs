//! The recommendation engine.
//!
//! Holds the shared embedder and one handle to the video collection.
//! `initialize` must succeed before anything else works; after that the
//! engine stays `Ready` for its whole lifetime.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use recs_embeddings::{Embedding, EmbeddingError, EmbeddingModel, LazyEmbedder};
use recs_types::{VideoDocument, VideoEmbeddingRecord};
use recs_vector::{Collection, VectorStore};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::error::{Cause, EngineError};
use crate::locks::KeyedLocks;
use crate::types::{CollectionStats, IndexingStats, Recommendation};

/// Lifecycle of a [`RecommendationEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EngineState {
    Uninitialized = 0,
    Initializing = 1,
    Ready = 2,
}

impl EngineState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => EngineState::Initializing,
            2 => EngineState::Ready,
            _ => EngineState::Uninitialized,
        }
    }
}

/// Semantic video index answering "videos like this text" queries.
pub struct RecommendationEngine<E: EmbeddingModel + 'static> {
    embedder: Arc<LazyEmbedder<E>>,
    store: Arc<dyn VectorStore>,
    config: EngineConfig,
    state: AtomicU8,
    init_lock: Mutex<()>,
    /// `None` before initialization and after a clear that could not recreate
    collection: RwLock<Option<Arc<dyn Collection>>>,
    video_locks: KeyedLocks,
}

impl<E: EmbeddingModel + 'static> RecommendationEngine<E> {
    pub fn new(
        embedder: Arc<LazyEmbedder<E>>,
        store: Arc<dyn VectorStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            config,
            state: AtomicU8::new(EngineState::Uninitialized as u8),
            init_lock: Mutex::new(()),
            collection: RwLock::new(None),
            video_locks: KeyedLocks::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> EngineState {
        EngineState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_ready(&self) -> bool {
        self.state() == EngineState::Ready
    }

    fn set_state(&self, state: EngineState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Open (or create) the video collection and load the embedder.
    ///
    /// Safe to call more than once: later calls on a ready engine return
    /// immediately, and concurrent calls wait for the first one. On failure
    /// the engine goes back to `Uninitialized` and can be retried.
    pub async fn initialize(&self) -> Result<(), EngineError> {
        let _init = self.init_lock.lock().await;
        if self.is_ready() {
            debug!("Recommendation engine already initialized");
            return Ok(());
        }

        self.set_state(EngineState::Initializing);
        info!(collection = %self.config.collection_name, "Initializing recommendation engine");

        match self.open_collection_and_embedder().await {
            Ok(()) => {
                self.set_state(EngineState::Ready);
                info!(collection = %self.config.collection_name, "Recommendation engine ready");
                Ok(())
            }
            Err(cause) => {
                *self.collection.write().await = None;
                self.set_state(EngineState::Uninitialized);
                error!(operation = "initialize", error = %cause, "Failed to initialize recommendation engine");
                Err(EngineError::Initialization(cause))
            }
        }
    }

    async fn open_collection_and_embedder(&self) -> Result<(), Cause> {
        let collection = self
            .store
            .get_or_create_collection(&self.config.collection_name)
            .await?;
        *self.collection.write().await = Some(collection);

        self.embedder.get_or_load().await?;
        Ok(())
    }

    /// Embed `text` with the loaded model. The result has unit length.
    pub async fn generate_embedding(&self, text: &str) -> Result<Embedding, EngineError> {
        let embedder = self.embedder.get().ok_or(EngineError::NotInitialized)?;
        embed(embedder, text).await.map_err(|cause| {
            error!(operation = "generate_embedding", error = %cause, "Failed to generate embedding");
            EngineError::Embedding(cause)
        })
    }

    /// Embed a video's text and store it, replacing any previous record
    /// with the same id.
    pub async fn add_or_update_video(
        &self,
        video_id: &str,
        title: &str,
        description: &str,
        tags: &[String],
    ) -> Result<(), EngineError> {
        let document = VideoDocument::new(video_id, title, description, tags.to_vec());
        self.add_or_update_document(&document).await
    }

    /// Same as [`add_or_update_video`](Self::add_or_update_video), taking a document.
    pub async fn add_or_update_document(&self, document: &VideoDocument) -> Result<(), EngineError> {
        let guard = self.collection.read().await;
        let collection = guard.as_ref().ok_or(EngineError::CollectionNotInitialized)?;
        let embedder = self.embedder.get().ok_or(EngineError::NotInitialized)?;

        let _video = self.video_locks.lock(&document.video_id).await;
        match upsert_document(collection.as_ref(), embedder, document).await {
            Ok(()) => {
                debug!(video_id = %document.video_id, "Video added or updated");
                Ok(())
            }
            Err(cause) => {
                error!(
                    operation = "add_or_update_video",
                    video_id = %document.video_id,
                    error = %cause,
                    "Failed to add or update video"
                );
                Err(EngineError::Upsert {
                    video_id: document.video_id.clone(),
                    source: cause,
                })
            }
        }
    }

    /// Add or update many videos, `batch_size` at a time.
    ///
    /// Each batch is embedded in one model call and stored in one upsert,
    /// so a failing batch counts all of its documents as errors and the run
    /// moves on. Documents whose text is blank are skipped. Lifecycle errors
    /// fail the whole call.
    pub async fn index_videos(&self, documents: &[VideoDocument]) -> Result<IndexingStats, EngineError> {
        let mut stats = IndexingStats::default();
        if documents.is_empty() {
            debug!("No videos to index");
            return Ok(stats);
        }

        let guard = self.collection.read().await;
        let collection = guard.as_ref().ok_or(EngineError::CollectionNotInitialized)?;
        let embedder = self.embedder.get().ok_or(EngineError::NotInitialized)?;

        info!(count = documents.len(), batch_size = self.config.batch_size, "Indexing videos");
        for batch in documents.chunks(self.config.batch_size.max(1)) {
            let mut batch_stats = IndexingStats {
                processed: batch.len(),
                ..Default::default()
            };

            let mut ready = Vec::with_capacity(batch.len());
            for document in batch {
                if document.embedding_text().trim().is_empty() {
                    debug!(video_id = %document.video_id, "Nothing to embed, skipping");
                    batch_stats.skipped += 1;
                } else if document.video_id.trim().is_empty() {
                    warn!(title = %document.title, "Video without id, not indexed");
                    batch_stats.errors += 1;
                } else {
                    ready.push(document);
                }
            }

            if !ready.is_empty() {
                match self
                    .upsert_batch(collection.as_ref(), Arc::clone(&embedder), &ready)
                    .await
                {
                    Ok(()) => batch_stats.indexed += ready.len(),
                    Err(cause) => {
                        warn!(count = ready.len(), error = %cause, "Failed to index batch");
                        batch_stats.errors += ready.len();
                    }
                }
            }

            stats.merge(&batch_stats);
        }

        info!(
            processed = stats.processed,
            indexed = stats.indexed,
            skipped = stats.skipped,
            errors = stats.errors,
            "Video indexing complete"
        );
        Ok(stats)
    }

    async fn upsert_batch(
        &self,
        collection: &dyn Collection,
        embedder: Arc<E>,
        documents: &[&VideoDocument],
    ) -> Result<(), Cause> {
        // Sorted acquisition so two overlapping batches cannot deadlock.
        let mut ids: Vec<&str> = documents.iter().map(|d| d.video_id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        let mut held = Vec::with_capacity(ids.len());
        for id in ids {
            held.push(self.video_locks.lock(id).await);
        }

        let texts: Vec<String> = documents.iter().map(|d| d.embedding_text()).collect();
        let embeddings = embed_batch(embedder, texts).await?;

        let records = documents
            .iter()
            .zip(embeddings)
            .map(|(document, embedding)| {
                VideoEmbeddingRecord::new(
                    document.video_id.clone(),
                    embedding.into_values(),
                    document.metadata(),
                )
            })
            .collect();
        collection.upsert(records).await?;
        Ok(())
    }

    /// Remove a video. Unknown ids are not an error.
    pub async fn delete_video(&self, video_id: &str) -> Result<(), EngineError> {
        let guard = self.collection.read().await;
        let collection = guard.as_ref().ok_or(EngineError::CollectionNotInitialized)?;

        let _video = self.video_locks.lock(video_id).await;
        match collection.delete(&[video_id.to_string()]).await {
            Ok(()) => {
                debug!(video_id = %video_id, "Video deleted");
                Ok(())
            }
            Err(e) => {
                error!(operation = "delete_video", video_id = %video_id, error = %e, "Failed to delete video");
                Err(EngineError::Delete {
                    video_id: video_id.to_string(),
                    source: e.into(),
                })
            }
        }
    }

    /// Ids of the videos closest to `text`, best first.
    pub async fn get_recommendations(&self, text: &str, limit: usize) -> Result<Vec<String>, EngineError> {
        let recommendations = self.get_scored_recommendations(text, limit).await?;
        Ok(recommendations.into_iter().map(|r| r.video_id).collect())
    }

    /// Videos closest to `text` with their titles and similarity scores.
    ///
    /// `limit` must be at least 1 and is capped at the configured maximum.
    /// Returns fewer results when the collection is smaller.
    pub async fn get_scored_recommendations(
        &self,
        text: &str,
        limit: usize,
    ) -> Result<Vec<Recommendation>, EngineError> {
        let limit = self.effective_limit(limit)?;

        let guard = self.collection.read().await;
        let collection = guard.as_ref().ok_or(EngineError::CollectionNotInitialized)?;
        let embedder = self.embedder.get().ok_or(EngineError::NotInitialized)?;

        let matches = async {
            let query = embed(embedder, text).await?;
            let mut results = collection.query(&[query], limit).await?;
            Ok::<_, Cause>(results.pop().unwrap_or_default())
        }
        .await
        .map_err(|cause| {
            error!(operation = "get_recommendations", error = %cause, "Failed to get recommendations");
            EngineError::Query(cause)
        })?;

        debug!(limit, found = matches.len(), "Recommendations ready");
        Ok(matches
            .into_iter()
            .map(|m| Recommendation {
                video_id: m.video_id,
                title: m.metadata.title,
                score: m.score,
            })
            .collect())
    }

    fn effective_limit(&self, limit: usize) -> Result<usize, EngineError> {
        if limit == 0 {
            return Err(EngineError::InvalidLimit);
        }
        if limit > self.config.max_limit {
            debug!(requested = limit, max = self.config.max_limit, "Clamping recommendation limit");
        }
        Ok(limit.min(self.config.max_limit))
    }

    /// Delete every video by dropping and recreating the collection.
    ///
    /// Waits for in-flight operations. If the collection is deleted but
    /// cannot be recreated, collection operations fail with
    /// `CollectionNotInitialized` until a later clear succeeds.
    pub async fn clear_collection(&self) -> Result<(), EngineError> {
        if !self.is_ready() {
            return Err(EngineError::CollectionNotInitialized);
        }

        let mut guard = self.collection.write().await;
        let name = &self.config.collection_name;

        if let Err(e) = self.store.delete_collection(name).await {
            error!(operation = "clear_collection", collection = %name, error = %e, "Failed to delete collection");
            return Err(EngineError::Clear(e.into()));
        }
        *guard = None;

        match self.store.get_or_create_collection(name).await {
            Ok(collection) => {
                *guard = Some(collection);
                info!(collection = %name, "Collection cleared");
                Ok(())
            }
            Err(e) => {
                error!(
                    operation = "clear_collection",
                    collection = %name,
                    error = %e,
                    "Collection deleted but not recreated"
                );
                Err(EngineError::Clear(e.into()))
            }
        }
    }

    /// Name, size and dimension of the video collection.
    pub async fn stats(&self) -> Result<CollectionStats, EngineError> {
        let guard = self.collection.read().await;
        let collection = guard.as_ref().ok_or(EngineError::CollectionNotInitialized)?;

        let read = async {
            let record_count = collection.count().await?;
            let dimension = collection.dimension().await?;
            Ok::<_, Cause>((record_count, dimension))
        };
        let (record_count, dimension) = read.await.map_err(|cause| {
            error!(operation = "stats", error = %cause, "Failed to read collection stats");
            EngineError::Stats(cause)
        })?;

        Ok(CollectionStats {
            name: collection.name().to_string(),
            record_count,
            dimension,
        })
    }
}

/// Run the model on the blocking pool.
async fn embed<E: EmbeddingModel + 'static>(embedder: Arc<E>, text: &str) -> Result<Embedding, Cause> {
    let text = text.to_string();
    let embedding = tokio::task::spawn_blocking(move || embedder.embed(&text)).await??;
    Ok(embedding)
}

/// Embed several texts in one model call on the blocking pool.
async fn embed_batch<E: EmbeddingModel + 'static>(
    embedder: Arc<E>,
    texts: Vec<String>,
) -> Result<Vec<Embedding>, Cause> {
    let expected = texts.len();
    let embeddings = tokio::task::spawn_blocking(move || {
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        embedder.embed_batch(&refs)
    })
    .await??;

    if embeddings.len() != expected {
        return Err(Cause::Embedding(EmbeddingError::InvalidInput(format!(
            "model returned {} embeddings for {} texts",
            embeddings.len(),
            expected
        ))));
    }
    Ok(embeddings)
}

async fn upsert_document<E: EmbeddingModel + 'static>(
    collection: &dyn Collection,
    embedder: Arc<E>,
    document: &VideoDocument,
) -> Result<(), Cause> {
    let embedding = embed(embedder, &document.embedding_text()).await?;
    let record = VideoEmbeddingRecord::new(
        document.video_id.clone(),
        embedding.into_values(),
        document.metadata(),
    );
    collection.upsert(vec![record]).await?;
    Ok(())
}
