//! Extension graph: edges, child indices, descendant indices.
//!
//! The graph is a forest by construction. Every non-root hash has
//! exactly one recorded parent (the extension record is keyed by
//! child), so a second `add_extension` for the same child must either
//! repeat the stored edge exactly (idempotent) or be rejected.
//! Branching is supported: two different deltas from the same parent
//! produce two different children under `children:<parent>`.

use std::collections::HashSet;

use crate::error::TeraError;
use crate::hash::GroupHash;
use crate::store::TeraStore;
use crate::store::kv::{KvBackend, KvTxn};
use crate::store::record::{
    BlockRole, ExtensionRecord, StoredBlock, block_key, children_key, ext_key, role_key, root_key,
};
use crate::store::unix_timestamp_now;
use crate::types::Extension;

impl<B: KvBackend> TeraStore<B> {
    /// Records an accepted extension in one atomic transaction.
    ///
    /// The transaction writes the extension record, stores the delta
    /// bytes as the child's block, appends the child to the parent's
    /// child index, walks to the root, and appends the child to the
    /// root's descendant index. On any failure the whole change rolls
    /// back.
    ///
    /// # Errors
    ///
    /// - [`TeraError::InvalidExtension`] if the homomorphic equality
    ///   fails, if the child already has a different recorded edge,
    ///   or if the child hash is already stored as root content.
    /// - [`TeraError::NotFound`] if the parent is unknown (neither a
    ///   stored block nor a recorded child).
    pub fn add_extension(&self, ext: &Extension) -> Result<ExtensionRecord, TeraError> {
        if !ext.crypto_valid() {
            return Err(TeraError::InvalidExtension(format!(
                "child {} is not parent {} extended by the supplied delta",
                ext.child.crypto.to_hex(),
                ext.parent.crypto.to_hex()
            )));
        }

        let parent = ext.parent.crypto;
        let child = ext.child.crypto;
        let mut txn = self.backend().begin()?;

        // Re-adding the identical edge is a no-op; a conflicting edge
        // for the same child would break the forest.
        if let Some(existing) = Self::get_json::<ExtensionRecord>(&txn, &ext_key(&child))? {
            if existing.parent == parent && existing.delta == ext.delta {
                return Ok(existing);
            }
            return Err(TeraError::InvalidExtension(format!(
                "child {} already has a recorded edge from parent {}",
                child.to_hex(),
                existing.parent.to_hex()
            )));
        }

        let parent_known =
            txn.get(&block_key(&parent))?.is_some() || txn.get(&ext_key(&parent))?.is_some();
        if !parent_known {
            return Err(TeraError::NotFound(format!(
                "parent {} of candidate extension",
                parent.to_hex()
            )));
        }

        if let Some(BlockRole::Root) = Self::role_in_txn(&txn, &child)? {
            return Err(TeraError::InvalidExtension(format!(
                "child {} is already stored as root content",
                child.to_hex()
            )));
        }

        let record = ExtensionRecord::from_extension(ext);
        Self::put_json(&mut txn, &ext_key(&child), &record)?;

        let block = StoredBlock {
            hash: child,
            data: ext.delta.clone(),
            size: ext.delta.len() as u64,
            timestamp: ext.timestamp.unwrap_or_else(unix_timestamp_now),
        };
        Self::put_json(&mut txn, &block_key(&child), &block)?;
        Self::put_json(&mut txn, &role_key(&child), &BlockRole::Delta)?;

        let child_hex = child.to_hex();
        let mut children: Vec<String> =
            Self::get_json(&txn, &children_key(&parent))?.unwrap_or_default();
        if !children.contains(&child_hex) {
            children.push(child_hex.clone());
        }
        Self::put_json(&mut txn, &children_key(&parent), &children)?;

        let root = Self::root_in_txn(&txn, &parent)?;
        let mut descendants: Vec<String> =
            Self::get_json(&txn, &root_key(&root))?.unwrap_or_default();
        if !descendants.contains(&child_hex) {
            descendants.push(child_hex);
        }
        Self::put_json(&mut txn, &root_key(&root), &descendants)?;

        txn.commit()?;
        Ok(record)
    }

    /// Fetches the recorded edge whose child is `child`, if any.
    pub fn get_extension(&self, child: &GroupHash) -> Result<Option<ExtensionRecord>, TeraError> {
        let txn = self.backend().begin()?;
        Self::get_json(&txn, &ext_key(child))
    }

    /// Walks from `hash` back to its root and returns the edges in
    /// root-to-leaf order.
    ///
    /// A hash with no incoming edge is itself a root and yields an
    /// empty chain.
    pub fn get_chain(&self, hash: &GroupHash) -> Result<Vec<ExtensionRecord>, TeraError> {
        let txn = self.backend().begin()?;
        Self::chain_in_txn(&txn, hash)
    }

    /// Returns the terminal node of the backward walk from `hash`.
    pub fn get_root(&self, hash: &GroupHash) -> Result<GroupHash, TeraError> {
        let txn = self.backend().begin()?;
        Self::root_in_txn(&txn, hash)
    }

    /// Reads the stored child index of `parent`.
    pub fn get_children(&self, parent: &GroupHash) -> Result<Vec<GroupHash>, TeraError> {
        let txn = self.backend().begin()?;
        let hexes: Vec<String> = Self::get_json(&txn, &children_key(parent))?.unwrap_or_default();
        hexes.iter().map(|h| GroupHash::from_hex(h)).collect()
    }

    /// Reads the stored descendant index of `root`.
    pub fn get_all_descendants(&self, root: &GroupHash) -> Result<Vec<GroupHash>, TeraError> {
        let txn = self.backend().begin()?;
        let hexes: Vec<String> = Self::get_json(&txn, &root_key(root))?.unwrap_or_default();
        hexes.iter().map(|h| GroupHash::from_hex(h)).collect()
    }

    /// Returns `true` iff an edge `parent -> child` is recorded.
    pub fn is_extension(&self, parent: &GroupHash, child: &GroupHash) -> Result<bool, TeraError> {
        let txn = self.backend().begin()?;
        match Self::get_json::<ExtensionRecord>(&txn, &ext_key(child))? {
            Some(record) => Ok(record.parent == *parent),
            None => Ok(false),
        }
    }

    pub(crate) fn chain_in_txn(
        txn: &B::Txn<'_>,
        hash: &GroupHash,
    ) -> Result<Vec<ExtensionRecord>, TeraError> {
        let mut chain = Vec::new();
        let mut cursor = *hash;
        let mut visited: HashSet<GroupHash> = HashSet::new();
        loop {
            if !visited.insert(cursor) {
                return Err(TeraError::CorruptIndex(format!(
                    "extension cycle through {}",
                    cursor.to_hex()
                )));
            }
            match Self::get_json::<ExtensionRecord>(txn, &ext_key(&cursor))? {
                Some(record) => {
                    cursor = record.parent;
                    chain.push(record);
                }
                None => break,
            }
        }
        chain.reverse();
        Ok(chain)
    }

    pub(crate) fn root_in_txn(txn: &B::Txn<'_>, start: &GroupHash) -> Result<GroupHash, TeraError> {
        let mut cursor = *start;
        let mut visited: HashSet<GroupHash> = HashSet::new();
        loop {
            if !visited.insert(cursor) {
                return Err(TeraError::CorruptIndex(format!(
                    "extension cycle through {}",
                    cursor.to_hex()
                )));
            }
            match Self::get_json::<ExtensionRecord>(txn, &ext_key(&cursor))? {
                Some(record) => cursor = record.parent,
                None => return Ok(cursor),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::record::CHILDREN_PREFIX;
    use crate::types::Content;
    use num_bigint::BigUint;

    fn seeded_root(store: &TeraStore<crate::store::MemoryBackend>, text: &str) -> Content {
        let content = Content::new(text);
        store.put(&content.data).expect("put root");
        content
    }

    #[test]
    fn add_extension_records_edge_and_indices() {
        let store = TeraStore::in_memory();
        let root = seeded_root(&store, "Hello");
        let (ext, child) = root.extend(b" World", Some(1_700_000_000), None);

        let record = store.add_extension(&ext).expect("add extension");
        assert_eq!(record.parent, root.dual.crypto);
        assert_eq!(record.child, child.dual.crypto);

        let children = store.get_children(&root.dual.crypto).expect("children");
        assert_eq!(children, [child.dual.crypto]);

        let descendants = store
            .get_all_descendants(&root.dual.crypto)
            .expect("descendants");
        assert_eq!(descendants, [child.dual.crypto]);

        assert!(
            store
                .is_extension(&root.dual.crypto, &child.dual.crypto)
                .expect("is_extension")
        );
    }

    #[test]
    fn add_extension_rejects_broken_homomorphic_equality() {
        let store = TeraStore::in_memory();
        let root = seeded_root(&store, "legitimate root");
        let (mut ext, _) = root.extend(b" delta", None, None);
        ext.child.crypto = crate::hash::element_hash(b"completely different content");

        let err = store.add_extension(&ext).expect_err("must reject");
        assert!(matches!(err, TeraError::InvalidExtension(_)), "{err:?}");
    }

    #[test]
    fn add_extension_requires_a_known_parent() {
        let store = TeraStore::in_memory();
        // Parent content never stored.
        let orphan_parent = Content::new("never stored");
        let (ext, _) = orphan_parent.extend(b" delta", None, None);

        let err = store.add_extension(&ext).expect_err("must reject");
        assert!(matches!(err, TeraError::NotFound(_)), "{err:?}");
    }

    #[test]
    fn identical_readd_is_idempotent_but_conflicts_are_rejected() {
        let store = TeraStore::in_memory();
        let root = seeded_root(&store, "base");
        let (ext, child) = root.extend(b" delta", None, None);

        store.add_extension(&ext).expect("first add");
        store.add_extension(&ext).expect("identical re-add");
        assert_eq!(
            store.get_children(&root.dual.crypto).expect("children"),
            [child.dual.crypto]
        );

        // A different (parent, delta) pair that still satisfies the
        // homomorphic equality for the same child: subtract the new
        // delta's element hash from the child in the group.
        let other_delta = b" other delta";
        let child_value = BigUint::from_bytes_be(child.dual.crypto.as_bytes());
        let delta_value =
            BigUint::from_bytes_be(crate::hash::element_hash(other_delta).as_bytes());
        let other_parent = GroupHash::reduce(&(child_value + crate::hash::modulus() - delta_value));

        let conflicting = Extension {
            parent: crate::types::DualHash {
                crypto: other_parent,
                semantic: crate::features::extract(b"other parent"),
            },
            delta: other_delta.to_vec(),
            child: ext.child.clone(),
            timestamp: None,
            publisher: None,
        };
        assert!(conflicting.crypto_valid());

        let err = store
            .add_extension(&conflicting)
            .expect_err("conflicting edge");
        assert!(matches!(err, TeraError::InvalidExtension(_)), "{err:?}");
    }

    #[test]
    fn failed_add_leaves_no_partial_state() {
        let store = TeraStore::in_memory();
        let root = seeded_root(&store, "atomic");
        let (mut ext, child) = root.extend(b" delta", None, None);
        ext.child.crypto = crate::hash::element_hash(b"forged");

        store.add_extension(&ext).expect_err("rejected");

        assert!(store.get_children(&root.dual.crypto).expect("children").is_empty());
        assert!(
            store
                .get_all_descendants(&root.dual.crypto)
                .expect("descendants")
                .is_empty()
        );
        assert!(!store.has(&child.dual.crypto).expect("has"));

        let txn = store.backend().begin().expect("begin");
        assert!(txn.keys_with_prefix(CHILDREN_PREFIX).expect("scan").is_empty());
    }

    #[test]
    fn branching_from_one_parent_is_supported() {
        let store = TeraStore::in_memory();
        let root = seeded_root(&store, "trunk");
        let (left, left_child) = root.extend(b" left", None, None);
        let (right, right_child) = root.extend(b" right", None, None);

        store.add_extension(&left).expect("left");
        store.add_extension(&right).expect("right");

        let children = store.get_children(&root.dual.crypto).expect("children");
        assert_eq!(children, [left_child.dual.crypto, right_child.dual.crypto]);
    }

    #[test]
    fn chain_walk_returns_root_to_leaf_order() {
        let store = TeraStore::in_memory();
        let root = seeded_root(&store, "Hello");
        let (e1, c1) = root.extend(b" World", None, None);
        let (e2, c2) = c1.extend(b"!", None, None);
        store.add_extension(&e1).expect("edge 1");
        store.add_extension(&e2).expect("edge 2");

        let chain = store.get_chain(&c2.dual.crypto).expect("chain");
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].parent, root.dual.crypto);
        assert_eq!(chain[0].child, c1.dual.crypto);
        assert_eq!(chain[1].child, c2.dual.crypto);

        assert_eq!(
            store.get_root(&c2.dual.crypto).expect("root"),
            root.dual.crypto
        );

        // Descendant index of the root lists both children.
        let descendants = store
            .get_all_descendants(&root.dual.crypto)
            .expect("descendants");
        assert_eq!(descendants, [c1.dual.crypto, c2.dual.crypto]);
    }

    #[test]
    fn a_hash_with_no_incoming_edge_is_its_own_root() {
        let store = TeraStore::in_memory();
        let lone = Content::new("standalone");
        store.put(&lone.data).expect("put");

        assert!(store.get_chain(&lone.dual.crypto).expect("chain").is_empty());
        assert_eq!(
            store.get_root(&lone.dual.crypto).expect("root"),
            lone.dual.crypto
        );
    }

    #[test]
    fn child_stored_as_root_content_is_rejected_as_child() {
        let store = TeraStore::in_memory();
        let root = seeded_root(&store, "parent text");
        let (ext, child) = root.extend(b" tail", None, None);

        // Simulate the child hash having been stored as root content.
        let mut txn = store.backend().begin().expect("begin");
        let fake = StoredBlock {
            hash: child.dual.crypto,
            data: child.data.clone(),
            size: child.data.len() as u64,
            timestamp: 0,
        };
        TeraStore::<crate::store::MemoryBackend>::put_json(
            &mut txn,
            &block_key(&child.dual.crypto),
            &fake,
        )
        .expect("put block");
        TeraStore::<crate::store::MemoryBackend>::put_json(
            &mut txn,
            &role_key(&child.dual.crypto),
            &BlockRole::Root,
        )
        .expect("put role");
        txn.commit().expect("commit");

        let err = store.add_extension(&ext).expect_err("root/child clash");
        assert!(matches!(err, TeraError::InvalidExtension(_)), "{err:?}");
    }
}
