//! Vector store error types.

use thiserror::Error;

/// Errors that can occur during vector store operations.
#[derive(Debug, Error)]
pub enum VectorError {
    /// usearch index error
    #[error("Index error: {0}")]
    Index(String),

    /// Dimension mismatch
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Record rejected before reaching the index
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// Collection name rejected
    #[error("Invalid collection name: {0:?}")]
    InvalidCollectionName(String),

    /// Handle used after its collection was deleted
    #[error("Collection was deleted: {0}")]
    CollectionDropped(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// RocksDB error
    #[error("Database error: {0}")]
    Database(#[from] rocksdb::Error),

    /// Blocking storage task panicked or was cancelled
    #[error("Storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// A lock was poisoned by a panicking writer
    #[error("Lock poisoned: {0}")]
    Poisoned(String),
}

impl VectorError {
    /// Whether retrying the same call could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, VectorError::Io(_) | VectorError::Database(_))
    }
}
