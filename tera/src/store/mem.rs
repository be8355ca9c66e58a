//! In-memory storage backend.
//!
//! This implementation is a first-class configuration, useful for
//! unit tests, benchmarks, and ephemeral nodes. A global mutex makes
//! transactions trivially serialisable: a transaction holds the lock
//! for its whole lifetime and stages writes in an overlay that is
//! merged into the base map on commit or discarded on drop.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use crate::error::TeraError;
use crate::store::kv::{KvBackend, KvTxn};

/// In-memory implementation of [`KvBackend`].
#[derive(Default)]
pub struct MemoryBackend {
    map: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    /// Creates a new, empty in-memory backend.
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvBackend for MemoryBackend {
    type Txn<'a>
        = MemoryTxn<'a>
    where
        Self: 'a;

    fn begin(&self) -> Result<MemoryTxn<'_>, TeraError> {
        let base = self
            .map
            .lock()
            .map_err(|_| TeraError::TransactionFailed("memory backend mutex poisoned".to_string()))?;
        Ok(MemoryTxn {
            base,
            staged: BTreeMap::new(),
        })
    }
}

/// Transaction over a [`MemoryBackend`].
///
/// `staged` maps keys to `Some(value)` for pending writes and `None`
/// for pending deletions.
pub struct MemoryTxn<'a> {
    base: MutexGuard<'a, BTreeMap<String, Vec<u8>>>,
    staged: BTreeMap<String, Option<Vec<u8>>>,
}

impl KvTxn for MemoryTxn<'_> {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, TeraError> {
        if let Some(staged) = self.staged.get(key) {
            return Ok(staged.clone());
        }
        Ok(self.base.get(key).cloned())
    }

    fn put(&mut self, key: &str, value: &[u8]) -> Result<(), TeraError> {
        self.staged.insert(key.to_string(), Some(value.to_vec()));
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<(), TeraError> {
        self.staged.insert(key.to_string(), None);
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, TeraError> {
        let mut keys: std::collections::BTreeSet<String> = self
            .base
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect();
        for (key, staged) in &self.staged {
            if !key.starts_with(prefix) {
                continue;
            }
            if staged.is_some() {
                keys.insert(key.clone());
            } else {
                keys.remove(key);
            }
        }
        Ok(keys.into_iter().collect())
    }

    fn commit(mut self) -> Result<(), TeraError> {
        let staged = std::mem::take(&mut self.staged);
        for (key, value) in staged {
            match value {
                Some(bytes) => {
                    self.base.insert(key, bytes);
                }
                None => {
                    self.base.remove(&key);
                }
            }
        }
        Ok(())
    }
}
