//! Per-connection session encryption.
//!
//! Wire-format compatible with the TonConnect JS SDK (`tweetnacl` `box`):
//! X25519 key agreement, XSalsa20-Poly1305, and a random 24-byte nonce
//! prepended to the ciphertext.
//!
//! ```text
//! [ nonce (24) | poly1305 tag (16) | ciphertext ]
//! ```
//!
//! The session id is the hex-encoded public key. It is what the relay routes
//! on (`client_id`) and what the dApp addresses its messages `to`.
//!
//! # Example
//!
//! ```
//! use bridge_crypto::SessionCrypto;
//!
//! let wallet = SessionCrypto::new();
//! let dapp = SessionCrypto::new();
//!
//! let sealed = dapp.encrypt(b"hello", wallet.public_key()).unwrap();
//! let opened = wallet.decrypt(&sealed, dapp.public_key()).unwrap();
//! assert_eq!(opened, b"hello");
//! ```

use std::fmt;

use crypto_box::aead::{Aead, AeadCore};
use crypto_box::{Nonce, PublicKey, SalsaBox, SecretKey};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};

use crate::error::CryptoError;

const NONCE_SIZE: usize = 24;
const TAG_SIZE: usize = 16;
const KEY_SIZE: usize = 32;

// ---------------------------------------------------------------------------
// SessionKeyPair
// ---------------------------------------------------------------------------

/// Hex-encoded keypair as persisted inside a remote connection.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionKeyPair {
    pub public_key: String,
    pub secret_key: String,
}

impl fmt::Debug for SessionKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKeyPair")
            .field("public_key", &self.public_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// SessionCrypto
// ---------------------------------------------------------------------------

/// The wallet's ephemeral keypair for one dApp session.
#[derive(Clone)]
pub struct SessionCrypto {
    secret: SecretKey,
    public: PublicKey,
    session_id: String,
}

impl SessionCrypto {
    /// Generates a fresh keypair from OS randomness.
    pub fn new() -> Self {
        Self::from_secret(SecretKey::generate(&mut OsRng))
    }

    /// Restores a session from its persisted keypair.
    ///
    /// The public half is re-derived from the secret and must match the stored
    /// one, so a corrupted record fails here rather than on the first message.
    pub fn from_keypair(keypair: &SessionKeyPair) -> Result<Self, CryptoError> {
        let secret = SecretKey::from(decode_key(&keypair.secret_key)?);
        let restored = Self::from_secret(secret);
        if !restored.session_id.eq_ignore_ascii_case(&keypair.public_key) {
            return Err(CryptoError::InvalidKey);
        }
        Ok(restored)
    }

    fn from_secret(secret: SecretKey) -> Self {
        let public = secret.public_key();
        let session_id = hex::encode(public.as_bytes());
        Self {
            secret,
            public,
            session_id,
        }
    }

    /// Hex-encoded public key.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Raw public key bytes.
    pub fn public_key(&self) -> &[u8; KEY_SIZE] {
        self.public.as_bytes()
    }

    /// Exports the keypair for persistence.
    pub fn stringify_keypair(&self) -> SessionKeyPair {
        SessionKeyPair {
            public_key: self.session_id.clone(),
            secret_key: hex::encode(self.secret.to_bytes()),
        }
    }

    /// Encrypts `plaintext` for `recipient`. Returns `nonce || box`.
    pub fn encrypt(&self, plaintext: &[u8], recipient: &[u8; KEY_SIZE]) -> Result<Vec<u8>, CryptoError> {
        let sealed_box = SalsaBox::new(&PublicKey::from(*recipient), &self.secret);
        let nonce = SalsaBox::generate_nonce(&mut OsRng);
        let sealed = sealed_box
            .encrypt(&nonce, plaintext)
            .map_err(|_| CryptoError::EncryptionFailed)?;

        let mut out = Vec::with_capacity(NONCE_SIZE + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    /// Decrypts `nonce || box` sent by `sender`.
    pub fn decrypt(&self, message: &[u8], sender: &[u8; KEY_SIZE]) -> Result<Vec<u8>, CryptoError> {
        if message.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CryptoError::InvalidMessage);
        }
        let (nonce, sealed) = message.split_at(NONCE_SIZE);
        let sealed_box = SalsaBox::new(&PublicKey::from(*sender), &self.secret);
        sealed_box
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| CryptoError::DecryptionFailed)
    }

    /// Encrypts for a peer identified by its hex session id.
    pub fn encrypt_to_hex(&self, plaintext: &[u8], recipient_hex: &str) -> Result<Vec<u8>, CryptoError> {
        self.encrypt(plaintext, &decode_key(recipient_hex)?)
    }

    /// Decrypts a message from a peer identified by its hex session id.
    pub fn decrypt_from_hex(&self, message: &[u8], sender_hex: &str) -> Result<Vec<u8>, CryptoError> {
        self.decrypt(message, &decode_key(sender_hex)?)
    }
}

impl Default for SessionCrypto {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SessionCrypto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCrypto")
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

/// Decodes a 32-byte hex key.
pub fn decode_key(hex_key: &str) -> Result<[u8; KEY_SIZE], CryptoError> {
    let mut out = [0u8; KEY_SIZE];
    hex::decode_to_slice(hex_key, &mut out).map_err(|_| CryptoError::InvalidKey)?;
    Ok(out)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_is_hex_public_key() {
        let s = SessionCrypto::new();
        assert_eq!(s.session_id().len(), 64);
        assert_eq!(hex::decode(s.session_id()).unwrap(), s.public_key());
    }

    #[test]
    fn encrypt_decrypt_between_peers() {
        let wallet = SessionCrypto::new();
        let dapp = SessionCrypto::new();

        let sealed = wallet.encrypt(b"{\"id\":\"1\"}", dapp.public_key()).unwrap();
        assert_eq!(sealed.len(), NONCE_SIZE + TAG_SIZE + 10);
        let opened = dapp.decrypt(&sealed, wallet.public_key()).unwrap();
        assert_eq!(opened, b"{\"id\":\"1\"}");
    }

    #[test]
    fn nonces_are_fresh() {
        let wallet = SessionCrypto::new();
        let dapp = SessionCrypto::new();
        let a = wallet.encrypt(b"same", dapp.public_key()).unwrap();
        let b = wallet.encrypt(b"same", dapp.public_key()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn tampered_ciphertext_fails_closed() {
        let wallet = SessionCrypto::new();
        let dapp = SessionCrypto::new();
        let mut sealed = dapp.encrypt(b"payload", wallet.public_key()).unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert_eq!(
            wallet.decrypt(&sealed, dapp.public_key()),
            Err(CryptoError::DecryptionFailed)
        );
    }

    #[test]
    fn wrong_sender_key_fails_closed() {
        let wallet = SessionCrypto::new();
        let dapp = SessionCrypto::new();
        let stranger = SessionCrypto::new();
        let sealed = dapp.encrypt(b"payload", wallet.public_key()).unwrap();
        assert_eq!(
            wallet.decrypt(&sealed, stranger.public_key()),
            Err(CryptoError::DecryptionFailed)
        );
    }

    #[test]
    fn short_message_is_invalid() {
        let wallet = SessionCrypto::new();
        assert_eq!(
            wallet.decrypt(&[0u8; 30], &[0u8; 32]),
            Err(CryptoError::InvalidMessage)
        );
    }

    #[test]
    fn keypair_round_trip_decrypts_old_messages() {
        let wallet = SessionCrypto::new();
        let dapp = SessionCrypto::new();
        let sealed = dapp.encrypt(b"after restart", wallet.public_key()).unwrap();

        let stored = serde_json::to_string(&wallet.stringify_keypair()).unwrap();
        let keypair: SessionKeyPair = serde_json::from_str(&stored).unwrap();
        let restored = SessionCrypto::from_keypair(&keypair).unwrap();

        assert_eq!(restored.session_id(), wallet.session_id());
        assert_eq!(restored.stringify_keypair(), wallet.stringify_keypair());
        assert_eq!(
            restored.decrypt_from_hex(&sealed, dapp.session_id()).unwrap(),
            b"after restart"
        );
    }

    #[test]
    fn mismatched_keypair_is_rejected() {
        let mut keypair = SessionCrypto::new().stringify_keypair();
        keypair.public_key = SessionCrypto::new().session_id().to_string();
        assert_eq!(
            SessionCrypto::from_keypair(&keypair).unwrap_err(),
            CryptoError::InvalidKey
        );

        keypair.secret_key = "zz".into();
        assert!(SessionCrypto::from_keypair(&keypair).is_err());
    }

    #[test]
    fn stored_keypair_uses_camel_case() {
        let json = serde_json::to_value(SessionCrypto::new().stringify_keypair()).unwrap();
        assert!(json.get("publicKey").is_some());
        assert!(json.get("secretKey").is_some());
    }

    #[test]
    fn debug_redacts_secret() {
        let keypair = SessionCrypto::new().stringify_keypair();
        let printed = format!("{keypair:?}");
        assert!(!printed.contains(&keypair.secret_key));
    }
}
