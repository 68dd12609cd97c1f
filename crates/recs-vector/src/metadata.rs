//! Record metadata storage for the HNSW store.
//!
//! The HNSW index only knows u64 keys. RocksDB maps them back to video ids,
//! keeps the stored vector (so an index file can be rebuilt) and records
//! per-collection bookkeeping.
//!
//! Keys are prefixed with `<collection>\0`, so one database serves every
//! collection and dropping a collection is a prefix delete.

use std::path::Path;

use chrono::Utc;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, Options, WriteBatch, DB};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use recs_types::VideoMetadata;

use crate::error::VectorError;

/// Collection bookkeeping: name -> CollectionInfo
pub const CF_COLLECTIONS: &str = "collections";

/// Records: `<collection>\0<video_id>` -> StoredRecord
pub const CF_RECORDS: &str = "vector_records";

/// Reverse map: `<collection>\0<key be bytes>` -> video_id
pub const CF_KEYS: &str = "vector_keys";

/// Per-collection bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub name: String,
    /// Vector dimension, set by the first upsert
    pub dimension: Option<usize>,
    /// Next unused HNSW key
    pub next_key: u64,
    /// Creation time (ms since epoch)
    pub created_at: i64,
}

impl CollectionInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dimension: None,
            next_key: 1,
            created_at: Utc::now().timestamp_millis(),
        }
    }

    /// Hand out the next HNSW key.
    pub fn allocate_key(&mut self) -> u64 {
        let key = self.next_key;
        self.next_key += 1;
        key
    }
}

/// A video's record as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// HNSW key
    pub key: u64,
    pub video_id: String,
    pub vector: Vec<f32>,
    pub metadata: VideoMetadata,
    /// Last upsert time (ms since epoch)
    pub updated_at: i64,
}

/// RocksDB-backed metadata for all collections of a store.
pub struct RecordMetadata {
    db: DB,
}

impl RecordMetadata {
    /// Open or create metadata storage.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, VectorError> {
        let path = path.as_ref();

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cfs = [CF_COLLECTIONS, CF_RECORDS, CF_KEYS]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, cfs)?;

        info!(path = ?path, "Opened vector metadata storage");
        Ok(Self { db })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily, VectorError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| VectorError::Index(format!("column family {} missing", name)))
    }

    pub fn get_collection(&self, name: &str) -> Result<Option<CollectionInfo>, VectorError> {
        match self.db.get_cf(self.cf(CF_COLLECTIONS)?, name.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn put_collection(&self, info: &CollectionInfo) -> Result<(), VectorError> {
        self.db
            .put_cf(self.cf(CF_COLLECTIONS)?, info.name.as_bytes(), encode(info)?)?;
        Ok(())
    }

    /// All collection names, sorted
    pub fn list_collections(&self) -> Result<Vec<String>, VectorError> {
        let mut names = Vec::new();
        for item in self.db.iterator_cf(self.cf(CF_COLLECTIONS)?, IteratorMode::Start) {
            let (key, _) = item?;
            names.push(String::from_utf8_lossy(&key).into_owned());
        }
        Ok(names)
    }

    pub fn get_record(
        &self,
        collection: &str,
        video_id: &str,
    ) -> Result<Option<StoredRecord>, VectorError> {
        let key = record_key(collection, video_id);
        match self.db.get_cf(self.cf(CF_RECORDS)?, key)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Look up the record stored under an HNSW key.
    pub fn get_record_by_key(
        &self,
        collection: &str,
        key: u64,
    ) -> Result<Option<StoredRecord>, VectorError> {
        match self.db.get_cf(self.cf(CF_KEYS)?, hnsw_key(collection, key))? {
            Some(video_id) => self.get_record(collection, &String::from_utf8_lossy(&video_id)),
            None => Ok(None),
        }
    }

    /// Write a record and its reverse key mapping atomically.
    pub fn put_record(&self, collection: &str, record: &StoredRecord) -> Result<(), VectorError> {
        let mut batch = WriteBatch::default();
        batch.put_cf(
            self.cf(CF_RECORDS)?,
            record_key(collection, &record.video_id),
            encode(record)?,
        );
        batch.put_cf(
            self.cf(CF_KEYS)?,
            hnsw_key(collection, record.key),
            record.video_id.as_bytes(),
        );
        self.db.write(batch)?;
        debug!(collection, video_id = %record.video_id, key = record.key, "Stored record");
        Ok(())
    }

    pub fn delete_record(&self, collection: &str, record: &StoredRecord) -> Result<(), VectorError> {
        let mut batch = WriteBatch::default();
        batch.delete_cf(self.cf(CF_RECORDS)?, record_key(collection, &record.video_id));
        batch.delete_cf(self.cf(CF_KEYS)?, hnsw_key(collection, record.key));
        self.db.write(batch)?;
        Ok(())
    }

    /// All records of a collection.
    pub fn records(&self, collection: &str) -> Result<Vec<StoredRecord>, VectorError> {
        let mut records = Vec::new();
        self.scan_prefix(CF_RECORDS, collection, |_, value| {
            records.push(decode(value)?);
            Ok(())
        })?;
        Ok(records)
    }

    pub fn count_records(&self, collection: &str) -> Result<usize, VectorError> {
        let mut count = 0;
        self.scan_prefix(CF_RECORDS, collection, |_, _| {
            count += 1;
            Ok(())
        })?;
        Ok(count)
    }

    /// Remove a collection's info, records and key mappings.
    pub fn drop_collection(&self, collection: &str) -> Result<usize, VectorError> {
        let mut batch = WriteBatch::default();
        let mut removed = 0;

        let records_cf = self.cf(CF_RECORDS)?;
        self.scan_prefix(CF_RECORDS, collection, |key, _| {
            batch.delete_cf(records_cf, key);
            removed += 1;
            Ok(())
        })?;

        let keys_cf = self.cf(CF_KEYS)?;
        self.scan_prefix(CF_KEYS, collection, |key, _| {
            batch.delete_cf(keys_cf, key);
            Ok(())
        })?;

        batch.delete_cf(self.cf(CF_COLLECTIONS)?, collection.as_bytes());
        self.db.write(batch)?;

        debug!(collection, removed, "Dropped collection metadata");
        Ok(removed)
    }

    fn scan_prefix<F>(&self, cf_name: &str, collection: &str, mut visit: F) -> Result<(), VectorError>
    where
        F: FnMut(&[u8], &[u8]) -> Result<(), VectorError>,
    {
        let prefix = collection_prefix(collection);
        let iter = self.db.iterator_cf(
            self.cf(cf_name)?,
            IteratorMode::From(prefix.as_slice(), Direction::Forward),
        );
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            visit(&key, &value)?;
        }
        Ok(())
    }
}

fn collection_prefix(collection: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(collection.len() + 1);
    prefix.extend_from_slice(collection.as_bytes());
    prefix.push(0);
    prefix
}

fn record_key(collection: &str, video_id: &str) -> Vec<u8> {
    let mut key = collection_prefix(collection);
    key.extend_from_slice(video_id.as_bytes());
    key
}

fn hnsw_key(collection: &str, key: u64) -> Vec<u8> {
    let mut out = collection_prefix(collection);
    out.extend_from_slice(&key.to_be_bytes());
    out
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, VectorError> {
    serde_json::to_vec(value).map_err(|e| VectorError::Serialization(e.to_string()))
}

fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, VectorError> {
    serde_json::from_slice(bytes).map_err(|e| VectorError::Serialization(e.to_string()))
}
