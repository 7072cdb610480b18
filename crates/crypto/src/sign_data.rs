//! Digests for `signData` requests with `text` and `binary` payloads.
//!
//! ```text
//! 0xffff || "ton-connect/sign-data/"
//!        || i32 BE workchain || 32-byte account hash
//!        || u32 BE domain length || domain
//!        || u64 BE timestamp
//!        || "txt" | "bin"
//!        || u32 BE payload length || payload
//! ```
//!
//! The wallet signs the SHA-256 of this message with its ed25519 key.

use sha2::{Digest, Sha256};

const SIGN_DATA_PREFIX: &[u8] = b"ton-connect/sign-data/";

/// Which textual kind of payload is being signed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Text,
    Binary,
}

impl PayloadKind {
    const fn tag(self) -> &'static [u8; 3] {
        match self {
            Self::Text => b"txt",
            Self::Binary => b"bin",
        }
    }
}

/// Builds the message for a text or binary payload.
pub fn sign_data_message(
    workchain: i32,
    account_hash: &[u8; 32],
    domain: &str,
    timestamp: u64,
    kind: PayloadKind,
    payload: &[u8],
) -> Vec<u8> {
    let domain = domain.as_bytes();
    let mut msg = Vec::with_capacity(2 + SIGN_DATA_PREFIX.len() + 36 + 4 + domain.len() + 8 + 3 + 4 + payload.len());
    msg.extend_from_slice(&[0xff, 0xff]);
    msg.extend_from_slice(SIGN_DATA_PREFIX);
    msg.extend_from_slice(&workchain.to_be_bytes());
    msg.extend_from_slice(account_hash);
    msg.extend_from_slice(&(domain.len() as u32).to_be_bytes());
    msg.extend_from_slice(domain);
    msg.extend_from_slice(&timestamp.to_be_bytes());
    msg.extend_from_slice(kind.tag());
    msg.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    msg.extend_from_slice(payload);
    msg
}

/// SHA-256 of [`sign_data_message`].
pub fn sign_data_digest(
    workchain: i32,
    account_hash: &[u8; 32],
    domain: &str,
    timestamp: u64,
    kind: PayloadKind,
    payload: &[u8],
) -> [u8; 32] {
    Sha256::digest(sign_data_message(workchain, account_hash, domain, timestamp, kind, payload)).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_layout() {
        let msg = sign_data_message(-1, &[0x22; 32], "a.io", 5, PayloadKind::Text, b"hi");
        let mut expected = vec![0xff, 0xff];
        expected.extend_from_slice(b"ton-connect/sign-data/");
        expected.extend_from_slice(&[0xff, 0xff, 0xff, 0xff]);
        expected.extend_from_slice(&[0x22; 32]);
        expected.extend_from_slice(&[0, 0, 0, 4]);
        expected.extend_from_slice(b"a.io");
        expected.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0, 5]);
        expected.extend_from_slice(b"txt");
        expected.extend_from_slice(&[0, 0, 0, 2]);
        expected.extend_from_slice(b"hi");
        assert_eq!(msg, expected);
    }

    #[test]
    fn kind_changes_digest() {
        let text = sign_data_digest(0, &[0; 32], "a.io", 1, PayloadKind::Text, b"x");
        let bin = sign_data_digest(0, &[0; 32], "a.io", 1, PayloadKind::Binary, b"x");
        assert_ne!(text, bin);
    }
}
