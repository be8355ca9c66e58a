//! RocksDB-backed storage backend.
//!
//! This implementation persists the store in a RocksDB
//! `TransactionDB` so that the multi-key writes of the extension
//! graph commit atomically. The whole store lives in the default
//! column family under string-prefixed keys (`blk:`, `idx:`, `ext:`,
//! `children:`, `root:`).

use std::fs;
use std::path::Path;

use rocksdb::{Direction, IteratorMode, Options, TransactionDB, TransactionDBOptions};

use crate::error::TeraError;
use crate::store::kv::{KvBackend, KvTxn};

/// Configuration for [`RocksDbBackend`].
#[derive(Clone, Debug)]
pub struct RocksDbConfig {
    /// Filesystem path to the RocksDB database directory.
    pub path: String,
    /// Whether to create the database if it does not yet exist.
    pub create_if_missing: bool,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            path: "data/tera-db".to_string(),
            create_if_missing: true,
        }
    }
}

/// RocksDB implementation of [`KvBackend`].
///
/// Closing the store drops this backend, which closes the database.
pub struct RocksDbBackend {
    db: TransactionDB,
}

impl RocksDbBackend {
    /// Opens (or creates) a RocksDB-backed store at the given path.
    ///
    /// The storage directory is created on open.
    pub fn open(cfg: &RocksDbConfig) -> Result<Self, TeraError> {
        let path = Path::new(&cfg.path);
        if cfg.create_if_missing {
            fs::create_dir_all(path).map_err(|e| {
                TeraError::TransactionFailed(format!(
                    "failed to create storage directory {}: {e}",
                    cfg.path
                ))
            })?;
        }

        let mut opts = Options::default();
        opts.create_if_missing(cfg.create_if_missing);
        let txn_opts = TransactionDBOptions::default();

        let db = TransactionDB::open(&opts, &txn_opts, path)?;
        Ok(Self { db })
    }
}

impl KvBackend for RocksDbBackend {
    type Txn<'a>
        = RocksDbTxn<'a>
    where
        Self: 'a;

    fn begin(&self) -> Result<RocksDbTxn<'_>, TeraError> {
        Ok(RocksDbTxn {
            inner: self.db.transaction(),
        })
    }
}

/// Transaction over a [`RocksDbBackend`]. Dropping without commit
/// rolls back.
pub struct RocksDbTxn<'a> {
    inner: rocksdb::Transaction<'a, TransactionDB>,
}

impl KvTxn for RocksDbTxn<'_> {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, TeraError> {
        Ok(self.inner.get(key.as_bytes())?)
    }

    fn put(&mut self, key: &str, value: &[u8]) -> Result<(), TeraError> {
        Ok(self.inner.put(key.as_bytes(), value)?)
    }

    fn delete(&mut self, key: &str) -> Result<(), TeraError> {
        Ok(self.inner.delete(key.as_bytes())?)
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, TeraError> {
        let mut keys = Vec::new();
        let mode = IteratorMode::From(prefix.as_bytes(), Direction::Forward);
        for item in self.inner.iterator(mode) {
            let (key, _) = item?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            keys.push(String::from_utf8_lossy(&key).into_owned());
        }
        Ok(keys)
    }

    fn commit(self) -> Result<(), TeraError> {
        Ok(self.inner.commit()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_temp() -> (TempDir, RocksDbBackend) {
        let tmp = TempDir::new().expect("create temp dir");
        let cfg = RocksDbConfig {
            path: tmp.path().join("db").to_string_lossy().to_string(),
            create_if_missing: true,
        };
        let backend = RocksDbBackend::open(&cfg).expect("open RocksDB");
        (tmp, backend)
    }

    #[test]
    fn rocksdb_roundtrips_values() {
        let (_tmp, backend) = open_temp();

        let mut txn = backend.begin().expect("begin");
        txn.put("blk:aa", b"one").expect("put");
        txn.commit().expect("commit");

        let txn = backend.begin().expect("begin");
        assert_eq!(txn.get("blk:aa").expect("get"), Some(b"one".to_vec()));
        assert_eq!(txn.get("blk:missing").expect("get"), None);
    }

    #[test]
    fn uncommitted_transactions_roll_back() {
        let (_tmp, backend) = open_temp();

        {
            let mut txn = backend.begin().expect("begin");
            txn.put("blk:aa", b"one").expect("put");
            // dropped without commit
        }

        let txn = backend.begin().expect("begin");
        assert_eq!(txn.get("blk:aa").expect("get"), None);
    }

    #[test]
    fn prefix_scan_is_bounded_and_ordered() {
        let (_tmp, backend) = open_temp();

        let mut txn = backend.begin().expect("begin");
        txn.put("blk:bb", b"2").expect("put");
        txn.put("blk:aa", b"1").expect("put");
        txn.put("children:aa", b"[]").expect("put");
        txn.put("ext:cc", b"{}").expect("put");
        txn.commit().expect("commit");

        let txn = backend.begin().expect("begin");
        let keys = txn.keys_with_prefix("blk:").expect("scan");
        assert_eq!(keys, ["blk:aa", "blk:bb"]);
    }

    #[test]
    fn data_survives_reopen() {
        let tmp = TempDir::new().expect("create temp dir");
        let cfg = RocksDbConfig {
            path: tmp.path().join("db").to_string_lossy().to_string(),
            create_if_missing: true,
        };

        {
            let backend = RocksDbBackend::open(&cfg).expect("open RocksDB");
            let mut txn = backend.begin().expect("begin");
            txn.put("blk:aa", b"persisted").expect("put");
            txn.commit().expect("commit");
        }

        let backend = RocksDbBackend::open(&cfg).expect("reopen RocksDB");
        let txn = backend.begin().expect("begin");
        assert_eq!(txn.get("blk:aa").expect("get"), Some(b"persisted".to_vec()));
    }
}
