//! Transactional key-value abstraction under the store.
//!
//! The store only ever talks to its backend through these two traits.
//! Every write path runs inside a single transaction so that
//! multi-key updates (extension record, child index, descendant
//! index) land all-or-nothing; read paths open a transaction and drop
//! it, which gives them a consistent snapshot.

use crate::error::TeraError;

/// Storage backend hosting a single flat keyspace.
///
/// Implementations can be backed by in-memory maps, RocksDB, etc. The
/// interface is intentionally small: the store only needs a way to
/// begin transactions.
pub trait KvBackend: Send + Sync {
    /// Transaction handle produced by [`begin`](KvBackend::begin).
    type Txn<'a>: KvTxn
    where
        Self: 'a;

    /// Begins a transaction with serialisable semantics.
    fn begin(&self) -> Result<Self::Txn<'_>, TeraError>;
}

/// One open transaction.
///
/// Dropping a transaction without calling
/// [`commit`](KvTxn::commit) discards all of its writes.
pub trait KvTxn {
    /// Reads the value stored under `key`, if any.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, TeraError>;

    /// Stages a write of `value` under `key`.
    fn put(&mut self, key: &str, value: &[u8]) -> Result<(), TeraError>;

    /// Stages a deletion of `key`. Deleting a missing key is a no-op.
    fn delete(&mut self, key: &str) -> Result<(), TeraError>;

    /// Returns every key starting with `prefix`, in ascending order,
    /// including keys written earlier in this transaction.
    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, TeraError>;

    /// Atomically applies all staged writes.
    fn commit(self) -> Result<(), TeraError>
    where
        Self: Sized;
}
