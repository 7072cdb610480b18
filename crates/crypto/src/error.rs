//! Crypto error type.

use std::fmt;

/// Errors returned by session encryption and signature handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoError {
    /// Key bytes are not valid hex or have the wrong length.
    InvalidKey,
    /// The ciphertext is too short to hold a nonce and tag.
    InvalidMessage,
    /// Encryption failed.
    EncryptionFailed,
    /// Authentication failed (wrong key or tampered ciphertext).
    DecryptionFailed,
    /// A signature is malformed or does not verify.
    InvalidSignature,
}

impl fmt::Display for CryptoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidKey => write!(f, "invalid key"),
            Self::InvalidMessage => write!(f, "invalid message"),
            Self::EncryptionFailed => write!(f, "encryption failed"),
            Self::DecryptionFailed => write!(f, "decryption failed"),
            Self::InvalidSignature => write!(f, "invalid signature"),
        }
    }
}

impl std::error::Error for CryptoError {}
