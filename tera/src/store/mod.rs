//! Durable, transactional content store and extension graph.
//!
//! This module provides:
//!
//! - the transactional key-value abstraction ([`kv`]) with in-memory
//!   ([`mem`]) and RocksDB ([`rocksdb`]) backends,
//! - the persisted record forms and keyspace layout ([`record`]),
//! - [`TeraStore`]: the blob layer (this file), the extension graph
//!   ([`graph`]), chain verification and reconstruction ([`verify`]),
//!   and integrity audit plus garbage collection ([`audit`]).

pub mod kv;
pub mod mem;
pub mod record;
pub mod rocksdb;

mod audit;
mod graph;
mod verify;

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::TeraError;
use crate::hash::{GroupHash, element_hash};
use crate::store::kv::{KvBackend, KvTxn};
use crate::store::record::{BLOCK_PREFIX, block_key, role_key};

pub use audit::{AuditReport, MAX_AUDIT_ERRORS};
pub use mem::MemoryBackend;
pub use record::{BlockRole, ExtensionRecord, StoredBlock};
pub use rocksdb::{RocksDbBackend, RocksDbConfig};
pub use verify::{ChainVerification, StepVerification};

/// Content store plus extension graph over a transactional backend.
///
/// The store owns its backend; dropping the store closes it. All
/// mutation paths run inside a single backend transaction, so a
/// failed multi-key update leaves no partial state behind.
pub struct TeraStore<B> {
    backend: B,
}

/// Type alias for the first-class in-memory configuration.
pub type MemoryStore = TeraStore<MemoryBackend>;

/// Type alias for the default durable (RocksDB) configuration.
pub type DefaultStore = TeraStore<RocksDbBackend>;

impl TeraStore<MemoryBackend> {
    /// Creates an ephemeral in-memory store whose lifetime equals the
    /// store's.
    pub fn in_memory() -> Self {
        Self {
            backend: MemoryBackend::new(),
        }
    }
}

impl TeraStore<RocksDbBackend> {
    /// Opens (or creates) a durable store at the configured path.
    pub fn open(cfg: &RocksDbConfig) -> Result<Self, TeraError> {
        Ok(Self {
            backend: RocksDbBackend::open(cfg)?,
        })
    }
}

impl<B: KvBackend> TeraStore<B> {
    /// Wraps an already-open backend.
    pub fn with_backend(backend: B) -> Self {
        Self { backend }
    }

    pub(crate) fn backend(&self) -> &B {
        &self.backend
    }

    pub(crate) fn get_json<T: DeserializeOwned>(
        txn: &B::Txn<'_>,
        key: &str,
    ) -> Result<Option<T>, TeraError> {
        match txn.get(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub(crate) fn put_json<T: Serialize>(
        txn: &mut B::Txn<'_>,
        key: &str,
        value: &T,
    ) -> Result<(), TeraError> {
        txn.put(key, &serde_json::to_vec(value)?)
    }

    /// Stores root content and returns its hash and persisted block.
    ///
    /// Re-putting identical bytes is idempotent and returns the
    /// existing block. The same key holding different bytes cannot
    /// happen while the extension invariant holds, so observing it is
    /// reported as a corruption fault.
    pub fn put(&self, data: &[u8]) -> Result<(GroupHash, StoredBlock), TeraError> {
        let hash = element_hash(data);
        let mut txn = self.backend.begin()?;

        if let Some(existing) = Self::get_json::<StoredBlock>(&txn, &block_key(&hash))? {
            if existing.data == data {
                return Ok((hash, existing));
            }
            return Err(TeraError::CorruptIndex(format!(
                "block {} already stored with different bytes",
                hash.to_hex()
            )));
        }

        let block = StoredBlock {
            hash,
            data: data.to_vec(),
            size: data.len() as u64,
            timestamp: unix_timestamp_now(),
        };
        Self::put_json(&mut txn, &block_key(&hash), &block)?;
        Self::put_json(&mut txn, &role_key(&hash), &BlockRole::Root)?;
        txn.commit()?;

        Ok((hash, block))
    }

    /// Fetches a block by hash. Absence is not an error.
    pub fn get(&self, hash: &GroupHash) -> Result<Option<StoredBlock>, TeraError> {
        let txn = self.backend.begin()?;
        Self::get_json(&txn, &block_key(hash))
    }

    /// Checks block existence without retrieving the bytes.
    pub fn has(&self, hash: &GroupHash) -> Result<bool, TeraError> {
        let txn = self.backend.begin()?;
        Ok(txn.get(&block_key(hash))?.is_some())
    }

    /// Removes a block and its role marker. Returns `true` if the
    /// block existed.
    ///
    /// This is the low-level blob operation; it does not touch graph
    /// indices. [`gc`](TeraStore::gc) is the safe deletion path.
    pub fn delete(&self, hash: &GroupHash) -> Result<bool, TeraError> {
        let mut txn = self.backend.begin()?;
        let existed = txn.get(&block_key(hash))?.is_some();
        txn.delete(&block_key(hash))?;
        txn.delete(&role_key(hash))?;
        txn.commit()?;
        Ok(existed)
    }

    /// Lists every stored block hash.
    pub fn list(&self) -> Result<Vec<GroupHash>, TeraError> {
        let txn = self.backend.begin()?;
        let mut hashes = Vec::new();
        for key in txn.keys_with_prefix(BLOCK_PREFIX)? {
            hashes.push(GroupHash::from_hex(&key[BLOCK_PREFIX.len()..])?);
        }
        Ok(hashes)
    }

    /// Number of stored blocks.
    pub fn count(&self) -> Result<usize, TeraError> {
        let txn = self.backend.begin()?;
        Ok(txn.keys_with_prefix(BLOCK_PREFIX)?.len())
    }

    /// Total stored payload bytes across all blocks.
    pub fn total_size(&self) -> Result<u64, TeraError> {
        let txn = self.backend.begin()?;
        let mut total = 0u64;
        for key in txn.keys_with_prefix(BLOCK_PREFIX)? {
            if let Some(block) = Self::get_json::<StoredBlock>(&txn, &key)? {
                total += block.size;
            }
        }
        Ok(total)
    }

    pub(crate) fn role_in_txn(
        txn: &B::Txn<'_>,
        hash: &GroupHash,
    ) -> Result<Option<BlockRole>, TeraError> {
        Self::get_json(txn, &role_key(hash))
    }
}

pub(crate) fn unix_timestamp_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_and_get_block_roundtrip() {
        let store = TeraStore::in_memory();

        let (hash, block) = store.put(b"Hello").expect("put");
        assert_eq!(hash, element_hash(b"Hello"));
        assert_eq!(block.size, 5);

        let fetched = store.get(&hash).expect("get").expect("block present");
        assert_eq!(fetched.data, b"Hello");
        assert!(store.has(&hash).expect("has"));
        assert_eq!(store.count().expect("count"), 1);
    }

    #[test]
    fn get_of_missing_block_is_none_not_an_error() {
        let store = TeraStore::in_memory();
        let missing = element_hash(b"never stored");
        assert!(store.get(&missing).expect("get").is_none());
        assert!(!store.has(&missing).expect("has"));
    }

    #[test]
    fn reput_of_identical_bytes_is_idempotent() {
        let store = TeraStore::in_memory();

        let (h1, b1) = store.put(b"same bytes").expect("first put");
        let (h2, b2) = store.put(b"same bytes").expect("second put");

        assert_eq!(h1, h2);
        assert_eq!(b1, b2);
        assert_eq!(store.count().expect("count"), 1);
    }

    #[test]
    fn list_count_and_total_size_agree() {
        let store = TeraStore::in_memory();
        store.put(b"aaaa").expect("put");
        store.put(b"bb").expect("put");

        let listed = store.list().expect("list");
        assert_eq!(listed.len(), 2);
        assert_eq!(store.count().expect("count"), 2);
        assert_eq!(store.total_size().expect("total size"), 6);
    }

    #[test]
    fn delete_removes_block_and_reports_prior_existence() {
        let store = TeraStore::in_memory();
        let (hash, _) = store.put(b"short lived").expect("put");

        assert!(store.delete(&hash).expect("delete"));
        assert!(!store.has(&hash).expect("has"));
        assert!(!store.delete(&hash).expect("second delete"));
    }
}
