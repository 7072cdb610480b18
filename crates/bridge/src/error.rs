//! Bridge error types.
//!
//! [`BridgeError`] covers host-facing failures. dApp-facing failures never
//! use it; they are encoded in-protocol as a `WalletResponse` error or a
//! `ConnectEventError`.

use std::fmt;

use bridge_crypto::CryptoError;
use protocol::ProtocolError;
use signer::SignerError;
use storage::StorageError;
use transport::TransportError;

// ---------------------------------------------------------------------------
// BridgeError
// ---------------------------------------------------------------------------

/// Errors from bridge operations.
#[derive(Debug)]
pub enum BridgeError {
    /// The key-value store failed.
    Storage(StorageError),

    /// A request from this client session is already awaiting a decision.
    AlreadyPending,

    /// No pending request exists for the given client session.
    RequestNotFound,

    /// No connected app matches the given URL or session.
    UnknownApp,

    /// A connect item or `signData` type the wallet cannot produce.
    UnsupportedItem(String),

    /// A queued request no longer passes validation.
    InvalidRequest(String),

    /// Session key material or a ciphertext was rejected.
    Crypto(CryptoError),

    /// The wallet signer failed or lacks a required key.
    Signer(SignerError),

    /// Relay or manifest HTTP traffic failed.
    Transport(TransportError),

    /// A link, address, or BOC could not be decoded.
    Protocol(ProtocolError),

    /// The bridge has been shut down.
    Cancelled,
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::AlreadyPending => write!(f, "request already pending"),
            Self::RequestNotFound => write!(f, "pending request not found"),
            Self::UnknownApp => write!(f, "unknown app"),
            Self::UnsupportedItem(name) => write!(f, "unsupported: {name}"),
            Self::InvalidRequest(reason) => write!(f, "invalid request: {reason}"),
            Self::Crypto(e) => write!(f, "crypto: {e}"),
            Self::Signer(e) => write!(f, "signer: {e}"),
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::Protocol(e) => write!(f, "protocol: {e}"),
            Self::Cancelled => write!(f, "bridge cancelled"),
        }
    }
}

impl std::error::Error for BridgeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage(e) => Some(e),
            Self::Crypto(e) => Some(e),
            Self::Signer(e) => Some(e),
            Self::Transport(e) => Some(e),
            Self::Protocol(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StorageError> for BridgeError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl From<CryptoError> for BridgeError {
    fn from(e: CryptoError) -> Self {
        Self::Crypto(e)
    }
}

impl From<SignerError> for BridgeError {
    fn from(e: SignerError) -> Self {
        Self::Signer(e)
    }
}

impl From<TransportError> for BridgeError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

impl From<ProtocolError> for BridgeError {
    fn from(e: ProtocolError) -> Self {
        Self::Protocol(e)
    }
}
