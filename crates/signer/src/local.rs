//! In-memory wallet signer.
//!
//! [`LocalWalletSigner`] holds raw key seeds in process memory. It is what the
//! daemon and the test suites use; a mobile host would implement
//! [`WalletSigner`] over its secure enclave instead.

use bridge_crypto::proof::{encode_ethereum_signature, ethereum_address};
use ed25519_dalek::{Signer, SigningKey};
use k256::ecdsa::SigningKey as EcdsaSigningKey;
use protocol::TonAddress;
use sha2::{Digest, Sha256};

use crate::{SignerError, WalletSigner};

// ---------------------------------------------------------------------------
// LocalWalletSigner
// ---------------------------------------------------------------------------

/// Wallet signer backed by in-memory keys.
///
/// The TON key and the wallet address are required. Solana and Ethereum keys
/// are opt-in via [`with_solana_seed`](Self::with_solana_seed) and
/// [`with_ethereum_key`](Self::with_ethereum_key).
pub struct LocalWalletSigner {
    ton_key: SigningKey,
    address: TonAddress,
    state_init: String,
    solana_key: Option<SigningKey>,
    ethereum_key: Option<EcdsaSigningKey>,
}

impl LocalWalletSigner {
    /// Creates a signer from a 32-byte ed25519 seed and the address of the
    /// wallet contract that key controls.
    pub fn new(seed: &[u8; 32], address: TonAddress, state_init: impl Into<String>) -> Self {
        Self {
            ton_key: SigningKey::from_bytes(seed),
            address,
            state_init: state_init.into(),
            solana_key: None,
            ethereum_key: None,
        }
    }

    /// Adds a Solana ed25519 key.
    pub fn with_solana_seed(mut self, seed: &[u8; 32]) -> Self {
        self.solana_key = Some(SigningKey::from_bytes(seed));
        self
    }

    /// Adds an Ethereum secp256k1 key.
    ///
    /// # Errors
    ///
    /// Returns [`SignerError::InvalidKey`] if `secret` is zero or not below
    /// the curve order.
    pub fn with_ethereum_key(mut self, secret: &[u8; 32]) -> Result<Self, SignerError> {
        let key = EcdsaSigningKey::from_slice(secret).map_err(|_| SignerError::InvalidKey)?;
        self.ethereum_key = Some(key);
        Ok(self)
    }

    /// Derives Solana and Ethereum keys from `master` with domain-separated
    /// SHA-256, so a single seed drives all three chains.
    pub fn with_derived_chain_keys(self, master: &[u8; 32]) -> Result<Self, SignerError> {
        let solana: [u8; 32] = Sha256::new()
            .chain_update(b"tonconnect/solana")
            .chain_update(master)
            .finalize()
            .into();
        let ethereum: [u8; 32] = Sha256::new()
            .chain_update(b"tonconnect/ethereum")
            .chain_update(master)
            .finalize()
            .into();
        self.with_solana_seed(&solana).with_ethereum_key(&ethereum)
    }
}

impl WalletSigner for LocalWalletSigner {
    fn address(&self) -> TonAddress {
        self.address
    }

    fn public_key(&self) -> [u8; 32] {
        self.ton_key.verifying_key().to_bytes()
    }

    fn wallet_state_init(&self) -> String {
        self.state_init.clone()
    }

    fn sign_ton(&self, message: &[u8]) -> Result<[u8; 64], SignerError> {
        Ok(self.ton_key.sign(message).to_bytes())
    }

    fn solana_public_key(&self) -> Option<[u8; 32]> {
        self.solana_key.as_ref().map(|k| k.verifying_key().to_bytes())
    }

    fn sign_solana(&self, message: &[u8]) -> Result<[u8; 64], SignerError> {
        let key = self
            .solana_key
            .as_ref()
            .ok_or(SignerError::MissingKey("solana"))?;
        Ok(key.sign(message).to_bytes())
    }

    fn ethereum_address(&self) -> Option<[u8; 20]> {
        self.ethereum_key
            .as_ref()
            .map(|k| ethereum_address(k.verifying_key()))
    }

    fn sign_ethereum_prehash(&self, digest: &[u8; 32]) -> Result<String, SignerError> {
        let key = self
            .ethereum_key
            .as_ref()
            .ok_or(SignerError::MissingKey("ethereum"))?;
        let (signature, recovery_id) = key
            .sign_prehash_recoverable(digest)
            .map_err(|_| SignerError::SigningFailed)?;
        Ok(encode_ethereum_signature(&signature, recovery_id))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_crypto::proof::{recover_ethereum_address, verify_ed25519};

    fn make_signer() -> LocalWalletSigner {
        LocalWalletSigner::new(&[1u8; 32], TonAddress::new(0, [9u8; 32]), "te6ccgEBAQEAAgAAAA==")
    }

    #[test]
    fn ton_signature_verifies() {
        let signer = make_signer();
        let digest = [5u8; 32];
        let sig = signer.sign_ton(&digest).unwrap();
        verify_ed25519(&signer.public_key(), &digest, &sig).unwrap();
    }

    #[test]
    fn chain_keys_are_absent_by_default() {
        let signer = make_signer();
        assert!(signer.solana_public_key().is_none());
        assert!(signer.ethereum_address().is_none());
        assert_eq!(signer.sign_solana(b"x"), Err(SignerError::MissingKey("solana")));
        assert_eq!(
            signer.sign_ethereum_prehash(&[0u8; 32]),
            Err(SignerError::MissingKey("ethereum"))
        );
    }

    #[test]
    fn derived_chain_keys_sign() {
        let signer = make_signer().with_derived_chain_keys(&[2u8; 32]).unwrap();

        let solana_pk = signer.solana_public_key().unwrap();
        assert_ne!(solana_pk, signer.public_key());
        let sig = signer.sign_solana(&[7u8; 32]).unwrap();
        verify_ed25519(&solana_pk, &[7u8; 32], &sig).unwrap();

        let digest = [8u8; 32];
        let encoded = signer.sign_ethereum_prehash(&digest).unwrap();
        assert_eq!(
            recover_ethereum_address(&digest, &encoded).unwrap(),
            signer.ethereum_address().unwrap()
        );
    }

    #[test]
    fn zero_ethereum_key_is_rejected() {
        assert_eq!(
            make_signer().with_ethereum_key(&[0u8; 32]).err(),
            Some(SignerError::InvalidKey)
        );
    }

    #[test]
    fn exposes_wallet_identity() {
        let signer = make_signer();
        assert_eq!(signer.address(), TonAddress::new(0, [9u8; 32]));
        assert_eq!(signer.wallet_state_init(), "te6ccgEBAQEAAgAAAA==");
    }

    #[test]
    fn signer_error_display() {
        assert_eq!(SignerError::MissingKey("solana").to_string(), "no solana key available");
    }
}
