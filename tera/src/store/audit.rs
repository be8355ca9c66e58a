//! Integrity audit and mark-and-sweep garbage collection.

use std::collections::{HashSet, VecDeque};

use serde::Serialize;

use crate::error::TeraError;
use crate::hash::GroupHash;
use crate::store::TeraStore;
use crate::store::kv::{KvBackend, KvTxn};
use crate::store::record::{
    BLOCK_PREFIX, CHILDREN_PREFIX, EXT_PREFIX, ROLE_PREFIX, ROOT_PREFIX, ExtensionRecord,
    children_key, ext_key,
};
use crate::store::verify::verify_step;

/// Upper bound on the number of messages kept in
/// [`AuditReport::errors`].
pub const MAX_AUDIT_ERRORS: usize = 32;

/// Counters produced by a read-only integrity audit.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct AuditReport {
    /// Number of stored blocks.
    pub total_blocks: usize,
    /// Number of recorded edges.
    pub total_edges: usize,
    /// Edges that failed step verification, plus child-index entries
    /// with no backing edge record.
    pub invalid_edges: usize,
    /// Blocks with neither a parent edge nor children.
    pub orphans: usize,
    /// Bounded list of human-readable findings.
    pub errors: Vec<String>,
}

impl AuditReport {
    fn record_error(&mut self, message: String) {
        if self.errors.len() < MAX_AUDIT_ERRORS {
            self.errors.push(message);
        }
    }
}

impl<B: KvBackend> TeraStore<B> {
    /// Walks every block and re-verifies every recorded edge under
    /// it. Read-only: the audit never mutates the store.
    pub fn audit(&self) -> Result<AuditReport, TeraError> {
        let txn = self.backend().begin()?;
        let mut report = AuditReport::default();

        let block_keys = txn.keys_with_prefix(BLOCK_PREFIX)?;
        report.total_blocks = block_keys.len();
        report.total_edges = txn.keys_with_prefix(EXT_PREFIX)?.len();

        for key in &block_keys {
            let hex = &key[BLOCK_PREFIX.len()..];
            let hash = GroupHash::from_hex(hex)?;

            let children: Vec<String> =
                Self::get_json(&txn, &children_key(&hash))?.unwrap_or_default();
            let has_parent = txn.get(&ext_key(&hash))?.is_some();
            if !has_parent && children.is_empty() {
                report.orphans += 1;
            }

            for child_hex in &children {
                let child = match GroupHash::from_hex(child_hex) {
                    Ok(child) => child,
                    Err(e) => {
                        report.invalid_edges += 1;
                        report.record_error(format!(
                            "children index of {hex} holds malformed entry {child_hex:?}: {e}"
                        ));
                        continue;
                    }
                };

                let record: Option<ExtensionRecord> =
                    Self::get_json(&txn, &ext_key(&child))?;
                if record.is_none() {
                    // CorruptIndex condition, reported rather than raised.
                    report.invalid_edges += 1;
                    report.record_error(format!(
                        "children index of {hex} refers to {child_hex} with no extension record"
                    ));
                    continue;
                }

                let step = verify_step(&hash, &child, record.as_ref());
                if !step.valid {
                    report.invalid_edges += 1;
                    report.record_error(format!(
                        "edge {hex} -> {child_hex}: {}",
                        step.reason.unwrap_or_else(|| "invalid".to_string())
                    ));
                }
            }
        }

        Ok(report)
    }

    /// Mark-and-sweep garbage collection.
    ///
    /// Marks the given roots and everything reachable from them
    /// through child indices, then deletes every unmarked block along
    /// with its role marker and extension record, and scrubs swept
    /// hashes out of the child and descendant indices. Runs in a
    /// single transaction and returns the number of blocks deleted.
    pub fn gc(&self, keep_roots: &[GroupHash]) -> Result<usize, TeraError> {
        let mut txn = self.backend().begin()?;

        // Mark phase: BFS over child indices, so a mid-chain keep
        // still protects its subtree.
        let mut marked: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<GroupHash> = keep_roots.iter().copied().collect();
        while let Some(hash) = queue.pop_front() {
            if !marked.insert(hash.to_hex()) {
                continue;
            }
            let children: Vec<String> =
                Self::get_json(&txn, &children_key(&hash))?.unwrap_or_default();
            for child_hex in children {
                queue.push_back(GroupHash::from_hex(&child_hex)?);
            }
        }

        // Sweep phase: blocks, role markers, extension records.
        let mut deleted: HashSet<String> = HashSet::new();
        for key in txn.keys_with_prefix(BLOCK_PREFIX)? {
            let hex = key[BLOCK_PREFIX.len()..].to_string();
            if marked.contains(&hex) {
                continue;
            }
            txn.delete(&key)?;
            txn.delete(&format!("{ROLE_PREFIX}{hex}"))?;
            txn.delete(&format!("{EXT_PREFIX}{hex}"))?;
            deleted.insert(hex);
        }

        // Scrub swept hashes out of both indices.
        for key in txn.keys_with_prefix(CHILDREN_PREFIX)? {
            let hex = &key[CHILDREN_PREFIX.len()..];
            if deleted.contains(hex) {
                txn.delete(&key)?;
                continue;
            }
            Self::scrub_index(&mut txn, &key, &deleted)?;
        }
        for key in txn.keys_with_prefix(ROOT_PREFIX)? {
            let hex = &key[ROOT_PREFIX.len()..];
            if deleted.contains(hex) {
                txn.delete(&key)?;
                continue;
            }
            Self::scrub_index(&mut txn, &key, &deleted)?;
        }

        txn.commit()?;
        Ok(deleted.len())
    }

    fn scrub_index(
        txn: &mut B::Txn<'_>,
        key: &str,
        deleted: &HashSet<String>,
    ) -> Result<(), TeraError> {
        let entries: Vec<String> = Self::get_json(txn, key)?.unwrap_or_default();
        let kept: Vec<String> = entries
            .iter()
            .filter(|entry| !deleted.contains(*entry))
            .cloned()
            .collect();
        if kept.len() == entries.len() {
            return Ok(());
        }
        if kept.is_empty() {
            txn.delete(key)?;
        } else {
            Self::put_json(txn, key, &kept)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::record::ext_key;
    use crate::types::Content;

    struct TwoTrees {
        store: crate::store::MemoryStore,
        keep_root: Content,
        keep_leaf: Content,
        drop_root: Content,
        drop_leaf: Content,
    }

    fn two_trees() -> TwoTrees {
        let store = TeraStore::in_memory();

        let keep_root = Content::new("keep me");
        store.put(&keep_root.data).expect("put keep root");
        let (e, keep_leaf) = keep_root.extend(b" forever", None, None);
        store.add_extension(&e).expect("keep edge");

        let drop_root = Content::new("drop me");
        store.put(&drop_root.data).expect("put drop root");
        let (e, drop_leaf) = drop_root.extend(b" soon", None, None);
        store.add_extension(&e).expect("drop edge");

        TwoTrees {
            store,
            keep_root,
            keep_leaf,
            drop_root,
            drop_leaf,
        }
    }

    #[test]
    fn audit_of_a_healthy_store_finds_no_invalid_edges() {
        let fx = two_trees();
        let report = fx.store.audit().expect("audit");

        assert_eq!(report.total_blocks, 4);
        assert_eq!(report.total_edges, 2);
        assert_eq!(report.invalid_edges, 0);
        assert_eq!(report.orphans, 0);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn audit_counts_standalone_blocks_as_orphans() {
        let store: crate::store::MemoryStore = TeraStore::in_memory();
        store.put(b"all alone").expect("put");

        let report = store.audit().expect("audit");
        assert_eq!(report.total_blocks, 1);
        assert_eq!(report.orphans, 1);
    }

    #[test]
    fn audit_reports_child_index_entries_with_no_edge_record() {
        let fx = two_trees();

        // Corrupt the store: drop the edge record but keep the index.
        let mut txn = fx.store.backend().begin().expect("begin");
        txn.delete(&ext_key(&fx.keep_leaf.dual.crypto)).expect("delete");
        txn.commit().expect("commit");

        let report = fx.store.audit().expect("audit");
        assert_eq!(report.invalid_edges, 1);
        assert!(
            report.errors[0].contains("no extension record"),
            "unexpected error: {}",
            report.errors[0]
        );
    }

    #[test]
    fn gc_keeps_marked_trees_and_sweeps_the_rest() {
        let fx = two_trees();

        let deleted = fx.store.gc(&[fx.keep_root.dual.crypto]).expect("gc");
        assert_eq!(deleted, 2);

        assert!(fx.store.has(&fx.keep_root.dual.crypto).expect("has"));
        assert!(fx.store.has(&fx.keep_leaf.dual.crypto).expect("has"));
        assert!(!fx.store.has(&fx.drop_root.dual.crypto).expect("has"));
        assert!(!fx.store.has(&fx.drop_leaf.dual.crypto).expect("has"));

        // Swept indices are gone too.
        assert!(
            fx.store
                .get_children(&fx.drop_root.dual.crypto)
                .expect("children")
                .is_empty()
        );
        assert!(
            fx.store
                .get_all_descendants(&fx.drop_root.dual.crypto)
                .expect("descendants")
                .is_empty()
        );
        assert!(
            fx.store
                .get_extension(&fx.drop_leaf.dual.crypto)
                .expect("ext")
                .is_none()
        );

        // The kept tree still verifies and reconstructs.
        let bytes = fx
            .store
            .verify_and_reconstruct(&fx.keep_root.dual.crypto, &fx.keep_leaf.dual.crypto)
            .expect("reconstruct");
        assert_eq!(bytes, b"keep me forever");
    }

    #[test]
    fn gc_with_no_roots_sweeps_everything() {
        let fx = two_trees();
        let deleted = fx.store.gc(&[]).expect("gc");
        assert_eq!(deleted, 4);
        assert_eq!(fx.store.count().expect("count"), 0);
    }

    #[test]
    fn gc_protects_the_subtree_of_a_mid_chain_keep() {
        let store: crate::store::MemoryStore = TeraStore::in_memory();
        let root = Content::new("r");
        store.put(&root.data).expect("put");
        let (e1, mid) = root.extend(b" m", None, None);
        let (e2, leaf) = mid.extend(b" l", None, None);
        store.add_extension(&e1).expect("e1");
        store.add_extension(&e2).expect("e2");

        let deleted = store.gc(&[mid.dual.crypto]).expect("gc");
        assert_eq!(deleted, 1);
        assert!(!store.has(&root.dual.crypto).expect("has"));
        assert!(store.has(&mid.dual.crypto).expect("has"));
        assert!(store.has(&leaf.dual.crypto).expect("has"));
    }

    #[test]
    fn audit_never_mutates_the_store() {
        let fx = two_trees();
        let before = fx.store.count().expect("count");
        fx.store.audit().expect("audit");
        fx.store.audit().expect("audit again");
        assert_eq!(fx.store.count().expect("count"), before);
        assert_eq!(fx.store.audit().expect("audit").total_blocks, before);
    }
}
