//! In-memory backend.

use dashmap::DashMap;

use crate::store::{KvStore, StoreError};

/// Volatile store; `flush` is a no-op.
#[derive(Debug, Default)]
pub struct MemDb {
    inner: DashMap<Vec<u8>, Vec<u8>>,
}

impl MemDb {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemDb {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.inner.get(key).map(|v| v.value().clone()))
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.inner.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
        self.inner.remove(key);
        Ok(())
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
