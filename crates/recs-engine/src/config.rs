//! Engine configuration.

use recs_types::{Settings, DEFAULT_COLLECTION_NAME};

/// Settings the engine itself needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Name of the vector collection holding the videos
    pub collection_name: String,
    /// Limit used by callers that have none of their own
    pub default_limit: usize,
    /// Requested limits above this are clamped
    pub max_limit: usize,
    /// Documents embedded and upserted together by `index_videos`
    pub batch_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            collection_name: DEFAULT_COLLECTION_NAME.to_string(),
            default_limit: 10,
            max_limit: 100,
            batch_size: 32,
        }
    }
}

impl EngineConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            collection_name: settings.collection_name.clone(),
            default_limit: settings.query.default_limit,
            max_limit: settings.query.max_limit,
            batch_size: settings.embedder.batch_size,
        }
    }
}
