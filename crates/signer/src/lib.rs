//! Signing abstractions for the TonConnect bridge.
//!
//! This crate provides:
//!
//! - [`WalletSigner`] trait -- the wallet's keys as an opaque capability
//! - [`LocalWalletSigner`] -- in-memory implementation backed by raw seeds
//!
//! # Design
//!
//! The bridge never sees secret keys. It builds the exact bytes to sign
//! (see `bridge_crypto::proof`) and hands them to a [`WalletSigner`]. Chain
//! keys other than TON are optional; a signer without them reports
//! [`SignerError::MissingKey`] and the bridge rejects the request item.

mod local;

pub use local::LocalWalletSigner;

use std::fmt;

use protocol::TonAddress;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Errors from wallet signing operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignerError {
    /// The wallet holds no key for this chain.
    MissingKey(&'static str),
    /// Key bytes are malformed.
    InvalidKey,
    /// The signing backend failed.
    SigningFailed,
    /// The user or the key backend refused to sign.
    Refused,
}

impl fmt::Display for SignerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingKey(chain) => write!(f, "no {chain} key available"),
            Self::InvalidKey => write!(f, "invalid key material"),
            Self::SigningFailed => write!(f, "signing failed"),
            Self::Refused => write!(f, "signing refused"),
        }
    }
}

impl std::error::Error for SignerError {}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Signing capability for one wallet account.
///
/// Implementations must be `Send + Sync`; the bridge shares one signer across
/// its watcher task and every adapter.
pub trait WalletSigner: Send + Sync {
    /// The wallet contract address.
    fn address(&self) -> TonAddress;

    /// The wallet's ed25519 public key.
    fn public_key(&self) -> [u8; 32];

    /// Base64 BOC of the wallet contract's state init.
    fn wallet_state_init(&self) -> String;

    /// ed25519 signature with the TON key over `message`.
    fn sign_ton(&self, message: &[u8]) -> Result<[u8; 64], SignerError>;

    /// Public key of the Solana account, if the wallet has one.
    fn solana_public_key(&self) -> Option<[u8; 32]> {
        None
    }

    /// ed25519 signature with the Solana key.
    fn sign_solana(&self, _message: &[u8]) -> Result<[u8; 64], SignerError> {
        Err(SignerError::MissingKey("solana"))
    }

    /// Ethereum account address, if the wallet has one.
    fn ethereum_address(&self) -> Option<[u8; 20]> {
        None
    }

    /// Recoverable secp256k1 signature over a 32-byte digest, rendered as
    /// `0x` + hex(r || s || v).
    fn sign_ethereum_prehash(&self, _digest: &[u8; 32]) -> Result<String, SignerError> {
        Err(SignerError::MissingKey("ethereum"))
    }
}
