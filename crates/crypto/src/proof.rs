//! Domain-ownership proofs (`ton_proof`, `solana_proof`, `ethereum_proof`).
//!
//! The signed bytes are fixed by the dApp-side verifier and must match
//! exactly:
//!
//! ```text
//! message = "ton-proof-item-v2/"
//!         || address bytes
//!         || u32 LE  domain length
//!         || domain
//!         || i64 LE  unix timestamp
//!         || payload
//!
//! digest  = H(0xffff || "ton-connect" || H(message))
//! ```
//!
//! `H` is SHA-256 for TON and Solana (signed with ed25519) and Keccak-256 for
//! Ethereum (signed with recoverable secp256k1 ECDSA, rendered `0x r||s||v`).

use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, VerifyingKey as EcdsaVerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use sha2::{Digest, Sha256};
use sha3::Keccak256;

use crate::error::CryptoError;

/// Prefix of every proof message.
pub const PROOF_ITEM_PREFIX: &[u8] = b"ton-proof-item-v2/";

/// Domain separator hashed into the final digest.
pub const CONNECT_PREFIX: &[u8] = b"ton-connect";

/// Offset added to the recovery id in Ethereum `v`.
const ETH_V_OFFSET: u8 = 27;

/// Hash family used for a proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProofHash {
    Sha256,
    Keccak256,
}

impl ProofHash {
    fn hash(self, data: &[u8]) -> [u8; 32] {
        match self {
            Self::Sha256 => Sha256::digest(data).into(),
            Self::Keccak256 => Keccak256::digest(data).into(),
        }
    }
}

/// Builds the proof message.
pub fn proof_message(address: &[u8], domain: &str, timestamp: u64, payload: &str) -> Vec<u8> {
    let domain = domain.as_bytes();
    let mut msg = Vec::with_capacity(
        PROOF_ITEM_PREFIX.len() + address.len() + 4 + domain.len() + 8 + payload.len(),
    );
    msg.extend_from_slice(PROOF_ITEM_PREFIX);
    msg.extend_from_slice(address);
    msg.extend_from_slice(&(domain.len() as u32).to_le_bytes());
    msg.extend_from_slice(domain);
    msg.extend_from_slice(&(timestamp as i64).to_le_bytes());
    msg.extend_from_slice(payload.as_bytes());
    msg
}

/// Final digest over a proof message.
pub fn proof_digest(message: &[u8], hash: ProofHash) -> [u8; 32] {
    let inner = hash.hash(message);
    let mut outer = Vec::with_capacity(2 + CONNECT_PREFIX.len() + 32);
    outer.extend_from_slice(&[0xff, 0xff]);
    outer.extend_from_slice(CONNECT_PREFIX);
    outer.extend_from_slice(&inner);
    hash.hash(&outer)
}

/// Verifies an ed25519 proof signature (TON, Solana).
pub fn verify_ed25519(
    public_key: &[u8; 32],
    digest: &[u8; 32],
    signature: &[u8],
) -> Result<(), CryptoError> {
    let key = VerifyingKey::from_bytes(public_key).map_err(|_| CryptoError::InvalidKey)?;
    let sig = Signature::from_slice(signature).map_err(|_| CryptoError::InvalidSignature)?;
    key.verify(digest, &sig)
        .map_err(|_| CryptoError::InvalidSignature)
}

/// Ethereum address of a secp256k1 public key: last 20 bytes of the
/// Keccak-256 of the uncompressed point without its `0x04` tag.
pub fn ethereum_address(key: &EcdsaVerifyingKey) -> [u8; 20] {
    let point = key.as_affine().to_encoded_point(false);
    let hash = Keccak256::digest(&point.as_bytes()[1..]);
    let mut out = [0u8; 20];
    out.copy_from_slice(&hash[12..]);
    out
}

/// Renders a recoverable signature as `0x` + hex(r || s || v), `v` = 27 + id.
pub fn encode_ethereum_signature(signature: &EcdsaSignature, recovery_id: RecoveryId) -> String {
    let mut bytes = [0u8; 65];
    bytes[..64].copy_from_slice(&signature.to_bytes());
    bytes[64] = ETH_V_OFFSET + recovery_id.to_byte();
    format!("0x{}", hex::encode(bytes))
}

/// Recovers the signer address from a `0x r||s||v` signature over `digest`.
pub fn recover_ethereum_address(digest: &[u8; 32], signature_hex: &str) -> Result<[u8; 20], CryptoError> {
    let raw = signature_hex.strip_prefix("0x").unwrap_or(signature_hex);
    let bytes = hex::decode(raw).map_err(|_| CryptoError::InvalidSignature)?;
    if bytes.len() != 65 {
        return Err(CryptoError::InvalidSignature);
    }
    let sig = EcdsaSignature::from_slice(&bytes[..64]).map_err(|_| CryptoError::InvalidSignature)?;
    let v = bytes[64].checked_sub(ETH_V_OFFSET).ok_or(CryptoError::InvalidSignature)?;
    let recid = RecoveryId::from_byte(v).ok_or(CryptoError::InvalidSignature)?;
    let key = EcdsaVerifyingKey::recover_from_prehash(digest, &sig, recid)
        .map_err(|_| CryptoError::InvalidSignature)?;
    Ok(ethereum_address(&key))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
