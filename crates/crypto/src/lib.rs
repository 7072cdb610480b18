//! Cryptographic building blocks for the TonConnect bridge.
//!
//! - [`session`] -- per-connection NaCl box used on the relay
//! - [`proof`] -- `ton_proof` message layout, digests, and signature checks
//! - [`sign_data`] -- digests for `signData` text and binary payloads
//!
//! Key custody lives in the `signer` crate; this crate only builds the bytes
//! that get signed and verifies the results.

pub mod error;
pub mod proof;
pub mod session;
pub mod sign_data;

pub use error::CryptoError;
pub use session::{SessionCrypto, SessionKeyPair};
