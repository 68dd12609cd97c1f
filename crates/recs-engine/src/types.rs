//! Result types returned by the engine.

use serde::{Deserialize, Serialize};

/// A recommended video with its similarity to the query text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub video_id: String,
    pub title: String,
    /// Cosine similarity, higher = closer
    pub score: f32,
}

/// Snapshot of the engine's collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionStats {
    pub name: String,
    pub record_count: usize,
    /// `None` until the first video is stored
    pub dimension: Option<usize>,
}

/// Outcome of a batch indexing run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexingStats {
    /// Documents looked at
    pub processed: usize,
    /// Documents embedded and stored
    pub indexed: usize,
    /// Documents with nothing to embed
    pub skipped: usize,
    /// Documents that failed
    pub errors: usize,
}

impl IndexingStats {
    /// Merge another run into this one
    pub fn merge(&mut self, other: &IndexingStats) {
        self.processed += other.processed;
        self.indexed += other.indexed;
        self.skipped += other.skipped;
        self.errors += other.errors;
    }
}
