//! # recs-types
//!
//! Shared domain types for the video recommendation engine.
//!
//! This crate defines the data structures passed between the engine, the
//! vector store and the CLI:
//! - Videos: the document a caller submits and the metadata stored with it
//! - Records: the `(id, vector, metadata)` triple held by a collection
//! - Settings: layered configuration
//!
//! ## Usage
//!
//! ```rust
//! use recs_types::VideoDocument;
//!
//! let doc = VideoDocument::new("v1", "Cats", "Videos about cats", vec!["pets".into()]);
//! assert_eq!(doc.embedding_text(), "Cats Videos about cats pets");
//! ```

pub mod config;
pub mod error;
pub mod video;

pub use config::{
    EmbedderProvider, EmbedderSettings, HnswSettings, QuerySettings, Settings,
    DEFAULT_COLLECTION_NAME,
};
pub use error::RecsError;
pub use video::{VideoDocument, VideoEmbeddingRecord, VideoMetadata};
