//! # recs-vector
//!
//! Named vector collections holding one embedding per video.
//!
//! The engine talks to storage only through the [`VectorStore`] and
//! [`Collection`] traits. Two stores are provided:
//! - [`MemoryStore`]: in-process, exact cosine search
//! - [`HnswStore`]: usearch HNSW index per collection, record metadata in RocksDB
//!
//! Every collection keeps at most one vector per video id (upsert replaces),
//! and all vectors in a collection share the dimension of the first upsert.

pub mod collection;
pub mod error;
pub mod hnsw;
pub mod memory;
pub mod metadata;
pub mod store;

pub use collection::{validate_collection_name, Collection, QueryMatch, VectorStore};
pub use error::VectorError;
pub use hnsw::{HnswConfig, HnswIndex};
pub use memory::{MemoryCollection, MemoryStore};
pub use metadata::{CollectionInfo, RecordMetadata, StoredRecord, CF_COLLECTIONS, CF_KEYS, CF_RECORDS};
pub use store::{HnswCollection, HnswStore, HnswStoreConfig};
