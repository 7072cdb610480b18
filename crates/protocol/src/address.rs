//! TON account addresses.
//!
//! An address is a signed workchain id plus a 32-byte account hash. Two
//! textual forms circulate:
//!
//! - raw: `"<workchain>:<64 hex chars>"`, e.g. `0:83df...`
//! - user-friendly: 36 bytes `[tag, workchain, hash(32), crc16(2)]` encoded as
//!   48 characters of standard or URL-safe base64
//!
//! The tag byte carries the bounceable and testnet flags. The checksum is
//! CRC-16/XMODEM over the first 34 bytes, big-endian.

use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use crc::{CRC_16_XMODEM, Crc};

use crate::error::ProtocolError;

/// Tag byte for bounceable addresses.
const TAG_BOUNCEABLE: u8 = 0x11;

/// Tag byte for non-bounceable addresses.
const TAG_NON_BOUNCEABLE: u8 = 0x51;

/// Flag OR-ed into the tag byte for testnet-only addresses.
const TAG_TESTNET: u8 = 0x80;

/// Length of a decoded user-friendly address.
const FRIENDLY_LEN: usize = 36;

const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

// ---------------------------------------------------------------------------
// TonAddress
// ---------------------------------------------------------------------------

/// A TON account address.
///
/// Equality compares workchain and hash only; the bounceable/testnet flags of
/// a user-friendly rendering are presentation details.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TonAddress {
    workchain: i32,
    hash: [u8; 32],
}

impl TonAddress {
    /// Creates an address from its parts.
    pub const fn new(workchain: i32, hash: [u8; 32]) -> Self {
        Self { workchain, hash }
    }

    /// Returns the workchain id.
    pub const fn workchain(&self) -> i32 {
        self.workchain
    }

    /// Returns the 32-byte account hash.
    pub const fn hash(&self) -> &[u8; 32] {
        &self.hash
    }

    /// Parses either textual form.
    ///
    /// Input containing `:` is treated as raw, anything else as user-friendly.
    pub fn parse(s: &str) -> Result<Self, ProtocolError> {
        let s = s.trim();
        if s.contains(':') {
            Self::parse_raw(s)
        } else {
            Self::parse_friendly(s)
        }
    }

    /// Parses `"<workchain>:<hex hash>"`.
    pub fn parse_raw(s: &str) -> Result<Self, ProtocolError> {
        let (wc, hash_hex) = s
            .split_once(':')
            .ok_or(ProtocolError::InvalidAddress("missing workchain separator"))?;
        let workchain = wc
            .parse::<i32>()
            .map_err(|_| ProtocolError::InvalidAddress("workchain is not an integer"))?;

        let mut hash = [0u8; 32];
        hex::decode_to_slice(hash_hex, &mut hash)
            .map_err(|_| ProtocolError::InvalidAddress("hash must be 64 hex characters"))?;

        Ok(Self { workchain, hash })
    }

    /// Parses a 48-character base64 (standard or URL-safe) address and
    /// verifies its checksum.
    pub fn parse_friendly(s: &str) -> Result<Self, ProtocolError> {
        if s.len() != 48 {
            return Err(ProtocolError::InvalidAddress(
                "user-friendly address must be 48 characters",
            ));
        }
        let normalized: String = s
            .chars()
            .map(|c| match c {
                '-' => '+',
                '_' => '/',
                other => other,
            })
            .collect();
        let bytes = STANDARD
            .decode(normalized)
            .map_err(|_| ProtocolError::InvalidAddress("invalid base64"))?;
        if bytes.len() != FRIENDLY_LEN {
            return Err(ProtocolError::InvalidAddress("decoded length is not 36 bytes"));
        }

        let tag = bytes[0] & !TAG_TESTNET;
        if tag != TAG_BOUNCEABLE && tag != TAG_NON_BOUNCEABLE {
            return Err(ProtocolError::InvalidAddress("unknown address tag"));
        }

        let expected = u16::from_be_bytes([bytes[34], bytes[35]]);
        if CRC16.checksum(&bytes[..34]) != expected {
            return Err(ProtocolError::InvalidAddress("checksum mismatch"));
        }

        let mut hash = [0u8; 32];
        hash.copy_from_slice(&bytes[2..34]);
        Ok(Self {
            workchain: i32::from(bytes[1] as i8),
            hash,
        })
    }

    /// Renders the raw form, e.g. `0:83df...`.
    pub fn to_raw_string(&self) -> String {
        format!("{}:{}", self.workchain, hex::encode(self.hash))
    }

    /// Renders the URL-safe user-friendly form.
    pub fn to_friendly(&self, bounceable: bool, testnet: bool) -> String {
        let mut buf = [0u8; FRIENDLY_LEN];
        buf[0] = if bounceable {
            TAG_BOUNCEABLE
        } else {
            TAG_NON_BOUNCEABLE
        };
        if testnet {
            buf[0] |= TAG_TESTNET;
        }
        // Friendly form only has room for an 8-bit workchain.
        buf[1] = self.workchain as i8 as u8;
        buf[2..34].copy_from_slice(&self.hash);
        let crc = CRC16.checksum(&buf[..34]);
        buf[34..].copy_from_slice(&crc.to_be_bytes());
        URL_SAFE_NO_PAD.encode(buf)
    }

    /// Address bytes as embedded in a `ton_proof` message: workchain as a
    /// big-endian `i32` followed by the hash.
    pub fn proof_bytes(&self) -> [u8; 36] {
        let mut out = [0u8; 36];
        out[..4].copy_from_slice(&self.workchain.to_be_bytes());
        out[4..].copy_from_slice(&self.hash);
        out
    }
}

impl fmt::Display for TonAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.workchain, hex::encode(self.hash))
    }
}

impl FromStr for TonAddress {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const ZERO_BOUNCEABLE: &str = "EQAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAM9c";
    const ZERO_NON_BOUNCEABLE: &str = "UQAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAJKZ";
    const ZERO_TESTNET: &str = "kQAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAHTW";

    fn sequential_hash() -> [u8; 32] {
        let mut hash = [0u8; 32];
        for (i, b) in hash.iter_mut().enumerate() {
            *b = i as u8;
        }
        hash
    }

    #[test]
    fn friendly_forms_of_zero_address() {
        let zero = TonAddress::new(0, [0u8; 32]);
        assert_eq!(zero.to_friendly(true, false), ZERO_BOUNCEABLE);
        assert_eq!(zero.to_friendly(false, false), ZERO_NON_BOUNCEABLE);
        assert_eq!(zero.to_friendly(true, true), ZERO_TESTNET);

        for s in [ZERO_BOUNCEABLE, ZERO_NON_BOUNCEABLE, ZERO_TESTNET] {
            assert_eq!(TonAddress::parse(s).unwrap(), zero);
        }
    }

    #[test]
    fn masterchain_address_uses_negative_workchain() {
        let addr = TonAddress::parse("Ef8AAQIDBAUGBwgJCgsMDQ4PEBESExQVFhcYGRobHB0eH-Lr").unwrap();
        assert_eq!(addr.workchain(), -1);
        assert_eq!(addr.hash(), &sequential_hash());
        assert_eq!(
            addr.to_raw_string(),
            "-1:000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f"
        );
    }

    #[test]
    fn standard_and_url_safe_base64_are_equivalent() {
        let url_safe = "Ef8AAQIDBAUGBwgJCgsMDQ4PEBESExQVFhcYGRobHB0eH-Lr";
        let standard = "Ef8AAQIDBAUGBwgJCgsMDQ4PEBESExQVFhcYGRobHB0eH+Lr";
        assert_eq!(
            TonAddress::parse(url_safe).unwrap(),
            TonAddress::parse(standard).unwrap()
        );
    }

    #[test]
    fn raw_round_trip() {
        let addr = TonAddress::new(0, sequential_hash());
        let raw = addr.to_raw_string();
        assert_eq!(TonAddress::parse(&raw).unwrap(), addr);
        assert_eq!(addr.to_string(), raw);
    }

    #[test]
    fn corrupted_checksum_is_rejected() {
        let mut corrupted = ZERO_BOUNCEABLE.to_string();
        corrupted.replace_range(10..11, "B");
        assert_eq!(
            TonAddress::parse(&corrupted),
            Err(ProtocolError::InvalidAddress("checksum mismatch"))
        );
    }

    #[test]
    fn malformed_inputs_are_rejected() {
        assert!(TonAddress::parse("").is_err());
        assert!(TonAddress::parse("EQ...").is_err());
        assert!(TonAddress::parse("x:00").is_err());
        assert!(TonAddress::parse("0:abcd").is_err());
    }

    #[test]
    fn proof_bytes_layout() {
        let addr = TonAddress::new(-1, [0xab; 32]);
        let bytes = addr.proof_bytes();
        assert_eq!(&bytes[..4], &[0xff, 0xff, 0xff, 0xff]);
        assert!(bytes[4..].iter().all(|&b| b == 0xab));
    }
}
