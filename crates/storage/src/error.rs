//! Storage error type shared by every key-value backend.

use std::fmt;

/// Errors that can occur when interacting with a storage backend.
///
/// This enum covers failures from any backend (LMDB, platform key-value
/// stores, in-memory maps). A missing key is not an error; reads return
/// `Ok(None)`.
#[derive(Debug)]
pub enum StorageError {
    /// The backend could not be opened or is no longer reachable.
    Unavailable(String),

    /// Encoding or decoding a stored value failed.
    Serialization(String),

    /// An unclassified backend error. Inspect the inner error for details.
    Internal(Box<dyn std::error::Error + Send + Sync>),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable(reason) => write!(f, "storage unavailable: {reason}"),
            Self::Serialization(detail) => write!(f, "serialization error: {detail}"),
            Self::Internal(e) => write!(f, "internal storage error: {e}"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Internal(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
