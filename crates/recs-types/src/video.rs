//! Video documents and the records stored for them.

use serde::{Deserialize, Serialize};

/// A video as submitted for indexing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoDocument {
    /// Unique video identifier (collection key)
    pub video_id: String,
    /// Video title
    pub title: String,
    /// Free-form description
    #[serde(default)]
    pub description: String,
    /// Tags attached to the video
    #[serde(default)]
    pub tags: Vec<String>,
}

impl VideoDocument {
    pub fn new(
        video_id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        tags: Vec<String>,
    ) -> Self {
        Self {
            video_id: video_id.into(),
            title: title.into(),
            description: description.into(),
            tags,
        }
    }

    /// Text that gets embedded for this video.
    ///
    /// Title, description and space-joined tags, separated by single spaces.
    pub fn embedding_text(&self) -> String {
        build_embedding_text(&self.title, &self.description, &self.tags)
    }

    /// Metadata stored alongside the vector.
    pub fn metadata(&self) -> VideoMetadata {
        VideoMetadata::new(&self.video_id, &self.title)
    }
}

/// Concatenate the searchable fields of a video into one text blob.
pub fn build_embedding_text(title: &str, description: &str, tags: &[String]) -> String {
    format!("{} {} {}", title, description, tags.join(" "))
}

/// Metadata kept with each vector: enough to render a result without a lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub id: String,
    pub title: String,
}

impl VideoMetadata {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
        }
    }
}

/// A vector record held by a collection, keyed by `video_id`.
///
/// At most one record per `video_id` exists in a collection at any time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoEmbeddingRecord {
    pub video_id: String,
    /// Unit-length embedding vector
    pub vector: Vec<f32>,
    pub metadata: VideoMetadata,
}

impl VideoEmbeddingRecord {
    pub fn new(video_id: impl Into<String>, vector: Vec<f32>, metadata: VideoMetadata) -> Self {
        Self {
            video_id: video_id.into(),
            vector,
            metadata,
        }
    }

    /// Embedding dimension of this record
    pub fn dimension(&self) -> usize {
        self.vector.len()
    }
}
