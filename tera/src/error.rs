use std::fmt;

/// Error type raised by the tera core.
///
/// Logical verification mismatches are *not* errors: `verify_*`
/// operations report them through structured results and only raise
/// on true I/O or encoding faults.
#[derive(Debug)]
pub enum TeraError {
    /// Block or extension record absent; safe to treat as "unknown".
    NotFound(String),
    /// A stored or inbound edge violates the homomorphic extension equality.
    InvalidExtension(String),
    /// Malformed hex, base64, JSON, or a wrong protocol version string.
    InvalidEncoding(String),
    /// An index refers to data that is missing or contradicts the store.
    CorruptIndex(String),
    /// The storage backend returned a non-retryable error.
    TransactionFailed(String),
    /// Similarity-kernel parameters outside their valid range.
    InvalidParameters(String),
}

impl fmt::Display for TeraError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TeraError::NotFound(msg) => write!(f, "not found: {msg}"),
            TeraError::InvalidExtension(msg) => write!(f, "invalid extension: {msg}"),
            TeraError::InvalidEncoding(msg) => write!(f, "invalid encoding: {msg}"),
            TeraError::CorruptIndex(msg) => write!(f, "corrupt index: {msg}"),
            TeraError::TransactionFailed(msg) => write!(f, "transaction failed: {msg}"),
            TeraError::InvalidParameters(msg) => write!(f, "invalid parameters: {msg}"),
        }
    }
}

impl std::error::Error for TeraError {}

impl From<serde_json::Error> for TeraError {
    fn from(e: serde_json::Error) -> Self {
        TeraError::InvalidEncoding(e.to_string())
    }
}

impl From<rocksdb::Error> for TeraError {
    fn from(e: rocksdb::Error) -> Self {
        TeraError::TransactionFailed(e.to_string())
    }
}
