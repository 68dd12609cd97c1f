//! Load-once embedder handle.
//!
//! Model loading is slow (file I/O, maybe a download), so it happens on the
//! first `get_or_load` and the loaded model is shared read-only afterwards.
//! One `LazyEmbedder` is meant to live for the whole process.

use std::fmt;
use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::error::EmbeddingError;
use crate::model::EmbeddingModel;

type Loader<E> = Arc<dyn Fn() -> Result<E, EmbeddingError> + Send + Sync>;

/// Lazily loaded, shared embedding model.
pub struct LazyEmbedder<E: EmbeddingModel + 'static> {
    cell: OnceCell<Arc<E>>,
    loader: Loader<E>,
}

impl<E: EmbeddingModel + 'static> LazyEmbedder<E> {
    /// Create a handle that loads the model with `loader` on first use.
    /// The loader runs on the blocking thread pool.
    pub fn new<F>(loader: F) -> Self
    where
        F: Fn() -> Result<E, EmbeddingError> + Send + Sync + 'static,
    {
        Self {
            cell: OnceCell::new(),
            loader: Arc::new(loader),
        }
    }

    /// Wrap a model that is already loaded.
    pub fn ready(model: E) -> Self {
        Self {
            cell: OnceCell::new_with(Some(Arc::new(model))),
            loader: Arc::new(|| Err(EmbeddingError::Loader("model was supplied pre-loaded".into()))),
        }
    }

    /// The model, if it has been loaded.
    pub fn get(&self) -> Option<Arc<E>> {
        self.cell.get().cloned()
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.initialized()
    }

    /// Return the model, loading it first if needed.
    ///
    /// Concurrent callers wait on a single load. A failed load leaves the
    /// handle empty so a later call can try again.
    pub async fn get_or_load(&self) -> Result<Arc<E>, EmbeddingError> {
        self.cell
            .get_or_try_init(|| async {
                let loader = Arc::clone(&self.loader);
                debug!("Loading embedding model on blocking pool");
                let model = tokio::task::spawn_blocking(move || (*loader)())
                    .await
                    .map_err(|e| EmbeddingError::Loader(e.to_string()))??;
                info!(
                    model = %model.info().name,
                    dim = model.info().dimension,
                    "Embedder ready"
                );
                Ok::<_, EmbeddingError>(Arc::new(model))
            })
            .await
            .cloned()
    }
}

impl<E: EmbeddingModel + 'static> fmt::Debug for LazyEmbedder<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyEmbedder")
            .field("loaded", &self.is_loaded())
            .finish()
    }
}
