//! Key-value storage: a raw byte store plus the graph adapter on top.
//!
//! [`KeyValueStore`] is the low-level interface; [`KeyValueStorage`] lays the
//! graph out over it and implements [`StorageAdapter`](super::StorageAdapter).

mod adapter;
mod memory;
#[cfg(feature = "rocksdb-backend")]
mod rocksdb_store;

pub use adapter::KeyValueStorage;
pub use memory::MemoryStore;
#[cfg(feature = "rocksdb-backend")]
pub use rocksdb_store::RocksDbStore;

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Key-value pair returned by scans.
pub type KeyValue = (Vec<u8>, Vec<u8>);

/// Byte-level store underneath [`KeyValueStorage`].
///
/// Batches are atomic: either every operation lands or none do.
pub trait KeyValueStore: Send + Sync {
    /// Store a key-value pair.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Storage`](crate::GraphError::Storage) if the
    /// write fails.
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Retrieve a value by key; `Ok(None)` when absent.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Retrieve several values in one call, in key order of the request.
    fn multi_get(&self, keys: &[Vec<u8>]) -> Result<Vec<Option<Vec<u8>>>> {
        keys.iter().map(|key| self.get(key)).collect()
    }

    /// Delete a key. Deleting a missing key is not an error.
    fn delete(&mut self, key: &[u8]) -> Result<()>;

    /// Check if a key exists.
    fn exists(&self, key: &[u8]) -> Result<bool>;

    /// All pairs whose key starts with `prefix`, in key order.
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<KeyValue>>;

    /// Execute a batch of write operations atomically.
    fn write_batch(&mut self, operations: Vec<BatchOperation>) -> Result<()>;

    /// Flush any buffered writes to disk.
    fn flush(&mut self) -> Result<()>;
}

/// Batch write operation for atomic updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchOperation {
    /// Put a key-value pair
    Put {
        /// Key to write
        key: Vec<u8>,
        /// Value to write
        value: Vec<u8>,
    },
    /// Delete a key
    Delete {
        /// Key to delete
        key: Vec<u8>,
    },
}

impl BatchOperation {
    /// Key the operation touches.
    pub fn key(&self) -> &[u8] {
        match self {
            BatchOperation::Put { key, .. } | BatchOperation::Delete { key } => key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trait_object_safe() {
        fn _accept_trait_object(_store: &dyn KeyValueStore) {}
    }

    #[test]
    fn test_default_multi_get_preserves_order() {
        let mut store = MemoryStore::new();
        store.put(b"b", b"2").unwrap();
        store.put(b"a", b"1").unwrap();

        let values = store
            .multi_get(&[b"b".to_vec(), b"missing".to_vec(), b"a".to_vec()])
            .unwrap();
        assert_eq!(values, vec![Some(b"2".to_vec()), None, Some(b"1".to_vec())]);
    }
}
