//! RocksDB key-value store.
//!
//! Writes go through the WAL and are durable immediately. A database opened
//! with [`RocksDbStore::open_with_ttl`] also drops entries physically during
//! compaction once they are older than the TTL.

use super::{BatchOperation, KeyValue, KeyValueStore};
use crate::error::{GraphError, Result};
use log::trace;
use rocksdb::{Options, WriteBatch, DB};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// RocksDB-backed persistent store.
#[derive(Clone)]
pub struct RocksDbStore {
    db: Arc<DB>,
}

impl RocksDbStore {
    fn options() -> Options {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts
    }

    /// Open or create a database at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Storage`] if the database cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = DB::open(&Self::options(), path.as_ref()).map_err(|e| {
            GraphError::storage(format!("Failed to open RocksDB at {:?}", path.as_ref()), Some(e))
        })?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Open or create a database whose entries are compacted away after
    /// `ttl`.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Storage`] if the database cannot be opened.
    pub fn open_with_ttl<P: AsRef<Path>>(path: P, ttl: Duration) -> Result<Self> {
        let db = DB::open_with_ttl(&Self::options(), path.as_ref(), ttl).map_err(|e| {
            GraphError::storage(
                format!("Failed to open RocksDB with TTL at {:?}", path.as_ref()),
                Some(e),
            )
        })?;
        Ok(Self { db: Arc::new(db) })
    }
}

impl KeyValueStore for RocksDbStore {
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.db
            .put(key, value)
            .map_err(|e| GraphError::storage("Failed to put key-value pair", Some(e)))
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.db
            .get(key)
            .map_err(|e| GraphError::storage("Failed to get value", Some(e)))
    }

    fn multi_get(&self, keys: &[Vec<u8>]) -> Result<Vec<Option<Vec<u8>>>> {
        trace!("multi_get of {} keys", keys.len());
        self.db
            .multi_get(keys)
            .into_iter()
            .map(|item| item.map_err(|e| GraphError::storage("Failed to multi-get values", Some(e))))
            .collect()
    }

    fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.db
            .delete(key)
            .map_err(|e| GraphError::storage("Failed to delete key", Some(e)))
    }

    fn exists(&self, key: &[u8]) -> Result<bool> {
        self.db
            .get(key)
            .map(|opt| opt.is_some())
            .map_err(|e| GraphError::storage("Failed to check key existence", Some(e)))
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<KeyValue>> {
        let mut results = Vec::new();
        for item in self.db.prefix_iterator(prefix) {
            let (key, value) =
                item.map_err(|e| GraphError::storage("Failed to iterate over prefix", Some(e)))?;
            // no prefix extractor is configured, so the iterator runs past the prefix
            if !key.starts_with(prefix) {
                break;
            }
            results.push((key.to_vec(), value.to_vec()));
        }
        Ok(results)
    }

    fn write_batch(&mut self, operations: Vec<BatchOperation>) -> Result<()> {
        trace!("write_batch of {} operations", operations.len());
        let mut batch = WriteBatch::default();
        for op in operations {
            match op {
                BatchOperation::Put { key, value } => batch.put(&key, &value),
                BatchOperation::Delete { key } => batch.delete(&key),
            }
        }
        self.db
            .write(batch)
            .map_err(|e| GraphError::storage("Failed to write batch", Some(e)))
    }

    fn flush(&mut self) -> Result<()> {
        self.db
            .flush()
            .map_err(|e| GraphError::storage("Failed to flush database", Some(e)))
    }
}
