//! Homomorphic set hashing over a prime-order group.
//!
//! This module provides the cryptographic identity layer of the store:
//!
//! - [`GroupHash`]: a value strictly below a fixed 256-bit prime `p`,
//!   carried as a 32-byte big-endian array,
//! - [`element_hash`]: arbitrary bytes -> group element, via BLAKE3-256
//!   reduced mod `p`,
//! - [`set_hash`] / [`extend`] / [`combine`]: the homomorphic sum of
//!   element hashes, with O(1) extension,
//! - [`verify_extension`]: the `new == old + e(delta)` check.
//!
//! The modulus is a single public compile-time constant. Per-instance
//! moduli are deliberately impossible: edges produced by one node must
//! verify on every other node.

use std::fmt;
use std::sync::LazyLock;

use num_bigint::BigUint;
use num_traits::Zero;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TeraError;

/// Length in bytes of the canonical [`GroupHash`] encoding.
pub const HASH_LEN: usize = 32;

/// Hex digits of the group modulus: the order of the secp256k1 curve
/// group, a well-known 256-bit prime.
const MODULUS_HEX: &str = "fffffffffffffffffffffffffffffffebaaedce6af48a03bbfd25e8cd0364141";

static MODULUS: LazyLock<BigUint> = LazyLock::new(|| {
    // Safe to expect: fixed, valid hex literal.
    BigUint::parse_bytes(MODULUS_HEX.as_bytes(), 16)
        .expect("hard-coded group modulus should parse")
});

/// Returns the public group modulus `p`.
pub fn modulus() -> &'static BigUint {
    &MODULUS
}

/// An element of the additive group of integers mod `p`.
///
/// The inner bytes are a 32-byte big-endian encoding, zero-padded on
/// the high side, and always represent a value strictly below the
/// modulus. Equality is value equality; the identity element is zero.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct GroupHash([u8; HASH_LEN]);

impl GroupHash {
    /// The group identity (zero); `set_hash` of the empty set.
    pub const IDENTITY: GroupHash = GroupHash([0u8; HASH_LEN]);

    /// Reduces an arbitrary non-negative integer into the group.
    pub fn reduce(n: &BigUint) -> Self {
        Self::from_reduced(&(n % &*MODULUS))
    }

    /// Adds two group elements mod `p`.
    pub fn add(&self, other: &GroupHash) -> GroupHash {
        GroupHash::reduce(&(self.to_biguint() + other.to_biguint()))
    }

    /// Returns `true` if this is the group identity.
    pub fn is_identity(&self) -> bool {
        self.0 == [0u8; HASH_LEN]
    }

    /// Returns the canonical 32-byte big-endian encoding.
    pub fn to_bytes(&self) -> [u8; HASH_LEN] {
        self.0
    }

    /// Borrows the canonical 32-byte big-endian encoding.
    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    /// Decodes a 32-byte big-endian encoding.
    ///
    /// Rejects inputs that are not exactly [`HASH_LEN`] bytes or that
    /// encode a value `>= p` (a non-canonical group element).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TeraError> {
        if bytes.len() != HASH_LEN {
            return Err(TeraError::InvalidEncoding(format!(
                "group hash must be {HASH_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        let value = BigUint::from_bytes_be(bytes);
        if value >= *MODULUS {
            return Err(TeraError::InvalidEncoding(
                "value is not a canonical group element (>= modulus)".to_string(),
            ));
        }
        let mut arr = [0u8; HASH_LEN];
        arr.copy_from_slice(bytes);
        Ok(GroupHash(arr))
    }

    /// Returns the lowercase hex encoding, always 64 digits, never
    /// `0x`-prefixed.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses a hex string, tolerating an optional `0x` prefix and
    /// missing leading zeros.
    pub fn from_hex(s: &str) -> Result<Self, TeraError> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        if digits.is_empty() || digits.len() > HASH_LEN * 2 {
            return Err(TeraError::InvalidEncoding(format!(
                "hex group hash must be 1..={} digits, got {}",
                HASH_LEN * 2,
                digits.len()
            )));
        }
        let value = BigUint::parse_bytes(digits.as_bytes(), 16)
            .ok_or_else(|| TeraError::InvalidEncoding(format!("malformed hex string {s:?}")))?;
        if value >= *MODULUS {
            return Err(TeraError::InvalidEncoding(
                "value is not a canonical group element (>= modulus)".to_string(),
            ));
        }
        Ok(Self::from_reduced(&value))
    }

    fn to_biguint(self) -> BigUint {
        BigUint::from_bytes_be(&self.0)
    }

    /// Encodes an already-reduced value. Callers must guarantee `n < p`.
    fn from_reduced(n: &BigUint) -> Self {
        let bytes = n.to_bytes_be();
        let mut arr = [0u8; HASH_LEN];
        if n.is_zero() {
            return GroupHash(arr);
        }
        arr[HASH_LEN - bytes.len()..].copy_from_slice(&bytes);
        GroupHash(arr)
    }
}

impl fmt::Display for GroupHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for GroupHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GroupHash({})", self.to_hex())
    }
}

impl Serialize for GroupHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for GroupHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        GroupHash::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Hashes arbitrary bytes into the group: BLAKE3-256 of `data`,
/// interpreted as a big-endian integer and reduced mod `p`.
///
/// Deterministic for a given byte slice; `element_hash(b"")` is
/// defined and non-identity.
pub fn element_hash(data: &[u8]) -> GroupHash {
    let digest = blake3::hash(data);
    GroupHash::reduce(&BigUint::from_bytes_be(digest.as_bytes()))
}

/// Hashes a finite collection of byte strings as the group sum of
/// their element hashes.
///
/// Commutative and associative; the empty collection hashes to the
/// identity.
pub fn set_hash<I, T>(items: I) -> GroupHash
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    items
        .into_iter()
        .fold(GroupHash::IDENTITY, |acc, item| {
            acc.add(&element_hash(item.as_ref()))
        })
}

/// Extends a set hash with one more element in O(1).
pub fn extend(hash: &GroupHash, delta: &[u8]) -> GroupHash {
    hash.add(&element_hash(delta))
}

/// Combines the hashes of two disjoint sets.
pub fn combine(a: &GroupHash, b: &GroupHash) -> GroupHash {
    a.add(b)
}

/// Checks that `new` is `old` extended with `delta`.
pub fn verify_extension(old: &GroupHash, new: &GroupHash, delta: &[u8]) -> bool {
    extend(old, delta) == *new
}
