//! Byte-keyed durable storage with atomic batches and snapshot reads.

use emberchain_derive::Error;
use std::collections::BTreeMap;
use std::sync::RwLock;

/// Storage infrastructure failures.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Persisted bytes contradict an invariant; the service must stop
    /// rather than continue from a divergent state.
    #[error("storage corruption: {0}")]
    Corruption(String),
    #[error("not found")]
    NotFound,
    #[error("io error: {0}")]
    Io(String),
}

impl PartialEq for StoreError {
    fn eq(&self, other: &Self) -> bool {
        matches!(
            (self, other),
            (StoreError::Corruption(_), StoreError::Corruption(_))
                | (StoreError::NotFound, StoreError::NotFound)
                | (StoreError::Io(_), StoreError::Io(_))
        )
    }
}

/// One entry of an atomic write batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

/// Read-only consistent view of the store.
pub trait KvSnapshot: Send {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;
}

/// Ordered byte-keyed storage backend.
///
/// One writer, many snapshot readers. `write_batch` is all-or-nothing: a
/// failed batch leaves durable state unchanged.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError>;

    fn delete(&self, key: &[u8]) -> Result<(), StoreError>;

    /// Applies every operation atomically, in order.
    fn write_batch(&self, ops: Vec<KvOp>) -> Result<(), StoreError>;

    /// Visits every `(key, value)` whose key starts with `prefix`, in
    /// ascending key order.
    fn iter_prefix(
        &self,
        prefix: &[u8],
        f: &mut dyn FnMut(&[u8], &[u8]) -> Result<(), StoreError>,
    ) -> Result<(), StoreError>;

    /// Captures a consistent read view.
    fn snapshot(&self) -> Box<dyn KvSnapshot>;
}

/// In-memory store for tests and development.
///
/// A BTreeMap behind a read-write lock; snapshots freeze a copy of the map.
pub struct MemoryKv {
    map: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self {
            map: RwLock::new(BTreeMap::new()),
        }
    }
}

impl Default for MemoryKv {
    fn default() -> Self {
        Self::new()
    }
}

struct MemorySnapshot {
    map: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl KvSnapshot for MemorySnapshot {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.map.get(key).cloned()
    }
}

impl KvStore for MemoryKv {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.map.read().unwrap().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.map.write().unwrap().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
        self.map.write().unwrap().remove(key);
        Ok(())
    }

    fn write_batch(&self, ops: Vec<KvOp>) -> Result<(), StoreError> {
        let mut map = self.map.write().unwrap();
        for op in ops {
            match op {
                KvOp::Put { key, value } => {
                    map.insert(key, value);
                }
                KvOp::Delete { key } => {
                    map.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn iter_prefix(
        &self,
        prefix: &[u8],
        f: &mut dyn FnMut(&[u8], &[u8]) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        let map = self.map.read().unwrap();
        for (key, value) in map.range(prefix.to_vec()..) {
            if !key.starts_with(prefix) {
                break;
            }
            f(key, value)?;
        }
        Ok(())
    }

    fn snapshot(&self) -> Box<dyn KvSnapshot> {
        Box::new(MemorySnapshot {
            map: self.map.read().unwrap().clone(),
        })
    }
}
