//! RocksDB-backed implementation of the KV contract.

use crate::storage::kv::{KvOp, KvSnapshot, KvStore, StoreError};
use rocksdb::{IteratorMode, WriteBatch, DB};
use std::path::Path;
use std::sync::Arc;

/// Durable store for production nodes.
///
/// A single default column family holds every namespace; the chain core's
/// key prefixes keep them apart. Batches map to RocksDB write batches, so
/// a commit is atomic on disk.
pub struct RocksKv {
    db: Arc<DB>,
}

impl RocksKv {
    /// Opens (or creates) a database under `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let mut options = rocksdb::Options::default();
        options.create_if_missing(true);
        let db = DB::open(&options, path).map_err(|e| StoreError::Io(e.to_string()))?;
        Ok(Self { db: Arc::new(db) })
    }
}

/// Read view over the live database.
///
/// The chain core has exactly one writer, and that writer is the party
/// holding this snapshot between `begin` and `commit`; nothing can slip a
/// write in between, so reading through to the live DB observes the same
/// bytes a point-in-time snapshot would.
struct RocksSnapshot {
    db: Arc<DB>,
}

impl KvSnapshot for RocksSnapshot {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.db.get(key).ok().flatten()
    }
}

impl KvStore for RocksKv {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.db.get(key).map_err(|e| StoreError::Io(e.to_string()))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.db.put(key, value).map_err(|e| StoreError::Io(e.to_string()))
    }

    fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
        self.db.delete(key).map_err(|e| StoreError::Io(e.to_string()))
    }

    fn write_batch(&self, ops: Vec<KvOp>) -> Result<(), StoreError> {
        let mut batch = WriteBatch::default();
        for op in ops {
            match op {
                KvOp::Put { key, value } => batch.put(key, value),
                KvOp::Delete { key } => batch.delete(key),
            }
        }
        self.db.write(batch).map_err(|e| StoreError::Io(e.to_string()))
    }

    fn iter_prefix(
        &self,
        prefix: &[u8],
        f: &mut dyn FnMut(&[u8], &[u8]) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        let mode = IteratorMode::From(prefix, rocksdb::Direction::Forward);
        for item in self.db.iterator(mode) {
            let (key, value) = item.map_err(|e| StoreError::Io(e.to_string()))?;
            if !key.starts_with(prefix) {
                break;
            }
            f(&key, &value)?;
        }
        Ok(())
    }

    fn snapshot(&self) -> Box<dyn KvSnapshot> {
        Box::new(RocksSnapshot {
            db: Arc::clone(&self.db),
        })
    }
}
