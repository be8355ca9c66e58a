//! Chain verification and content reconstruction.
//!
//! Verification never raises on a logical mismatch: a bad step is
//! reported through the structured result, and errors are reserved
//! for I/O and encoding faults.

use crate::error::TeraError;
use crate::hash::{self, GroupHash};
use crate::store::TeraStore;
use crate::store::kv::KvBackend;
use crate::store::record::{ExtensionRecord, StoredBlock, block_key, ext_key};

/// Outcome of verifying a single parent -> child step.
#[derive(Clone, Debug, PartialEq)]
pub struct StepVerification {
    /// `true` if the recorded edge matches the claimed parent and the
    /// homomorphic equality holds.
    pub valid: bool,
    /// Names the failed check when `valid` is `false`.
    pub reason: Option<String>,
}

impl StepVerification {
    fn ok() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    fn fail(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
        }
    }
}

/// Structured result of a root-to-target chain verification.
#[derive(Clone, Debug, PartialEq)]
pub struct ChainVerification {
    /// `true` if every step verified and the walk ended at the target.
    pub valid: bool,
    /// Names the failed step when `valid` is `false`.
    pub reason: Option<String>,
    /// Number of edges in the fetched chain.
    pub chain_length: usize,
    /// The claimed root the walk started from.
    pub root: GroupHash,
    /// Where the walk actually ended.
    pub final_hash: GroupHash,
}

impl<B: KvBackend> TeraStore<B> {
    /// Verifies one recorded step: the edge for `child` must exist,
    /// name `parent` as its parent, and satisfy the homomorphic
    /// equality.
    pub fn verify_extension_step(
        &self,
        parent: &GroupHash,
        child: &GroupHash,
    ) -> Result<StepVerification, TeraError> {
        let txn = self.backend().begin()?;
        let record: Option<ExtensionRecord> = Self::get_json(&txn, &ext_key(child))?;
        Ok(verify_step(parent, child, record.as_ref()))
    }

    /// Verifies the whole chain from `root` to `target`, in time
    /// linear in the chain length.
    ///
    /// The walk keeps a cursor starting at `root`; each record must
    /// name the cursor as its parent and extend it to its child. The
    /// chain is valid when the final cursor equals `target`.
    pub fn verify_chain(
        &self,
        root: &GroupHash,
        target: &GroupHash,
    ) -> Result<ChainVerification, TeraError> {
        let chain = self.get_chain(target)?;
        let chain_length = chain.len();
        let mut cursor = *root;

        for (step, record) in chain.iter().enumerate() {
            if record.parent != cursor {
                return Ok(ChainVerification {
                    valid: false,
                    reason: Some(format!(
                        "step {step}: recorded parent {} does not match cursor {}",
                        record.parent.to_hex(),
                        cursor.to_hex()
                    )),
                    chain_length,
                    root: *root,
                    final_hash: cursor,
                });
            }
            if !hash::verify_extension(&cursor, &record.child, &record.delta) {
                return Ok(ChainVerification {
                    valid: false,
                    reason: Some(format!(
                        "step {step}: extending {} does not yield recorded child {}",
                        cursor.to_hex(),
                        record.child.to_hex()
                    )),
                    chain_length,
                    root: *root,
                    final_hash: cursor,
                });
            }
            cursor = record.child;
        }

        if cursor != *target {
            return Ok(ChainVerification {
                valid: false,
                reason: Some(format!(
                    "chain from {} ends at {}, not at target {}",
                    root.to_hex(),
                    cursor.to_hex(),
                    target.to_hex()
                )),
                chain_length,
                root: *root,
                final_hash: cursor,
            });
        }

        Ok(ChainVerification {
            valid: true,
            reason: None,
            chain_length,
            root: *root,
            final_hash: cursor,
        })
    }

    /// Rebuilds the full bytes of `target` by replaying its chain:
    /// root bytes first, then each delta in order.
    ///
    /// # Errors
    ///
    /// [`TeraError::NotFound`] if the root block is missing.
    pub fn reconstruct(&self, target: &GroupHash) -> Result<Vec<u8>, TeraError> {
        let txn = self.backend().begin()?;
        let chain = Self::chain_in_txn(&txn, target)?;
        let root = chain.first().map_or(*target, |record| record.parent);

        let root_block: StoredBlock = Self::get_json(&txn, &block_key(&root))?
            .ok_or_else(|| TeraError::NotFound(format!("root block {}", root.to_hex())))?;

        let mut data = root_block.data;
        for record in &chain {
            data.extend_from_slice(&record.delta);
        }
        Ok(data)
    }

    /// Verifies the chain first and reconstructs only on success.
    ///
    /// # Errors
    ///
    /// [`TeraError::InvalidExtension`] carrying the verification
    /// reason when the chain does not verify.
    pub fn verify_and_reconstruct(
        &self,
        root: &GroupHash,
        target: &GroupHash,
    ) -> Result<Vec<u8>, TeraError> {
        let verdict = self.verify_chain(root, target)?;
        if !verdict.valid {
            return Err(TeraError::InvalidExtension(
                verdict
                    .reason
                    .unwrap_or_else(|| "chain verification failed".to_string()),
            ));
        }
        self.reconstruct(target)
    }
}

pub(crate) fn verify_step(
    parent: &GroupHash,
    child: &GroupHash,
    record: Option<&ExtensionRecord>,
) -> StepVerification {
    let Some(record) = record else {
        return StepVerification::fail(format!("no extension record for {}", child.to_hex()));
    };
    if record.parent != *parent {
        return StepVerification::fail(format!(
            "recorded parent {} does not match {}",
            record.parent.to_hex(),
            parent.to_hex()
        ));
    }
    if !hash::verify_extension(parent, child, &record.delta) {
        return StepVerification::fail(format!(
            "extending {} by the recorded delta does not yield {}",
            parent.to_hex(),
            child.to_hex()
        ));
    }
    StepVerification::ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::element_hash;
    use crate::types::Content;

    struct ChainFixture {
        store: crate::store::MemoryStore,
        root: Content,
        middle: Content,
        leaf: Content,
    }

    /// Builds the chain "Hello" -> " World" -> "!".
    fn hello_chain() -> ChainFixture {
        let store = TeraStore::in_memory();
        let root = Content::new("Hello");
        store.put(&root.data).expect("put root");

        let (e1, middle) = root.extend(b" World", None, None);
        let (e2, leaf) = middle.extend(b"!", None, None);
        store.add_extension(&e1).expect("edge 1");
        store.add_extension(&e2).expect("edge 2");

        ChainFixture {
            store,
            root,
            middle,
            leaf,
        }
    }

    #[test]
    fn verify_chain_accepts_a_stored_chain() {
        let fx = hello_chain();
        let verdict = fx
            .store
            .verify_chain(&fx.root.dual.crypto, &fx.leaf.dual.crypto)
            .expect("verify");

        assert!(verdict.valid, "reason: {:?}", verdict.reason);
        assert_eq!(verdict.chain_length, 2);
        assert_eq!(verdict.root, fx.root.dual.crypto);
        assert_eq!(verdict.final_hash, fx.leaf.dual.crypto);
    }

    #[test]
    fn verify_chain_names_the_failing_step_on_a_wrong_root() {
        let fx = hello_chain();
        let wrong_root = element_hash(b"someone else");
        let verdict = fx
            .store
            .verify_chain(&wrong_root, &fx.leaf.dual.crypto)
            .expect("verify");

        assert!(!verdict.valid);
        let reason = verdict.reason.expect("reason");
        assert!(reason.starts_with("step 0"), "unexpected reason: {reason}");
    }

    #[test]
    fn verify_chain_rejects_a_target_off_the_chain() {
        let fx = hello_chain();
        let stranger = element_hash(b"not on this chain");
        let verdict = fx
            .store
            .verify_chain(&fx.root.dual.crypto, &stranger)
            .expect("verify");

        assert!(!verdict.valid);
        assert!(verdict.reason.expect("reason").contains("ends at"));
    }

    #[test]
    fn verify_chain_of_a_root_against_itself_is_empty_and_valid() {
        let fx = hello_chain();
        let verdict = fx
            .store
            .verify_chain(&fx.root.dual.crypto, &fx.root.dual.crypto)
            .expect("verify");

        assert!(verdict.valid);
        assert_eq!(verdict.chain_length, 0);
    }

    #[test]
    fn reconstruct_replays_root_bytes_plus_deltas() {
        let fx = hello_chain();
        let bytes = fx.store.reconstruct(&fx.leaf.dual.crypto).expect("reconstruct");
        assert_eq!(bytes, b"Hello World!");

        let middle = fx
            .store
            .reconstruct(&fx.middle.dual.crypto)
            .expect("reconstruct middle");
        assert_eq!(middle, b"Hello World");

        let root = fx.store.reconstruct(&fx.root.dual.crypto).expect("reconstruct root");
        assert_eq!(root, b"Hello");
    }

    #[test]
    fn reconstructed_bytes_rederive_the_stored_hashes() {
        let fx = hello_chain();
        let chain = fx.store.get_chain(&fx.leaf.dual.crypto).expect("chain");

        let mut cursor = element_hash(b"Hello");
        for record in &chain {
            cursor = crate::hash::extend(&cursor, &record.delta);
            assert_eq!(cursor, record.child);
        }
        assert_eq!(cursor, fx.leaf.dual.crypto);
    }

    #[test]
    fn verify_and_reconstruct_refuses_an_invalid_chain() {
        let fx = hello_chain();
        let wrong_root = element_hash(b"impostor");

        let err = fx
            .store
            .verify_and_reconstruct(&wrong_root, &fx.leaf.dual.crypto)
            .expect_err("must refuse");
        assert!(matches!(err, TeraError::InvalidExtension(_)), "{err:?}");

        let bytes = fx
            .store
            .verify_and_reconstruct(&fx.root.dual.crypto, &fx.leaf.dual.crypto)
            .expect("valid chain reconstructs");
        assert_eq!(bytes, b"Hello World!");
    }

    #[test]
    fn reconstruct_of_unknown_root_is_not_found() {
        let store: crate::store::MemoryStore = TeraStore::in_memory();
        let missing = element_hash(b"missing");
        let err = store.reconstruct(&missing).expect_err("missing root");
        assert!(matches!(err, TeraError::NotFound(_)), "{err:?}");
    }

    #[test]
    fn verify_extension_step_checks_the_recorded_edge() {
        let fx = hello_chain();

        let step = fx
            .store
            .verify_extension_step(&fx.root.dual.crypto, &fx.middle.dual.crypto)
            .expect("step");
        assert!(step.valid);

        // Wrong claimed parent.
        let step = fx
            .store
            .verify_extension_step(&fx.leaf.dual.crypto, &fx.middle.dual.crypto)
            .expect("step");
        assert!(!step.valid);
        assert!(step.reason.expect("reason").contains("does not match"));

        // No record at all.
        let step = fx
            .store
            .verify_extension_step(&fx.root.dual.crypto, &element_hash(b"stranger"))
            .expect("step");
        assert!(!step.valid);
        assert!(step.reason.expect("reason").contains("no extension record"));
    }
}
