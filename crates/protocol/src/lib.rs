//! Core wire types and codecs for the TonConnect bridge.
//!
//! This crate provides the foundational, I/O-free pieces shared by every
//! other crate in the workspace:
//!
//! - [`Network`] -- TON network identifier and its chain id
//! - [`TonAddress`] -- raw (`wc:hex`) and user-friendly (base64) address codec
//! - [`boc`] -- bag-of-cells deserializer used to validate payload blobs
//! - [`messages`] -- RPC requests, wallet responses, and connect events
//! - [`dapp`] -- URL normalization, extension keys, and domain checks
//! - [`link`] -- `tc://` / universal-link connect query parsing
//!
//! Nothing here touches the network, the clock, or persistent storage.

pub mod address;
pub mod boc;
pub mod dapp;
pub mod device;
pub mod error;
pub mod error_code;
pub mod link;
pub mod messages;

pub use address::TonAddress;
pub use device::{DeviceInfo, Feature, SignDataType};
pub use error::ProtocolError;
pub use error_code::ErrorCode;
pub use link::{ConnectQrQuery, ReturnStrategy};

use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------

/// TON network identifier.
///
/// dApps name the network by its global chain id (`"-239"` / `"-3"`), both in
/// `ton_addr` reply items and in the optional `network` field of
/// `sendTransaction` requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Network {
    /// TON mainnet.
    Mainnet,

    /// TON testnet.
    Testnet,
}

impl Network {
    /// Returns the chain id string used on the wire.
    pub const fn chain_id(self) -> &'static str {
        match self {
            Self::Mainnet => "-239",
            Self::Testnet => "-3",
        }
    }

    /// Looks a network up by its wire chain id.
    pub fn from_chain_id(chain_id: &str) -> Option<Self> {
        match chain_id {
            "-239" => Some(Self::Mainnet),
            "-3" => Some(Self::Testnet),
            _ => None,
        }
    }

    /// Whether user-friendly addresses should carry the testnet flag.
    pub const fn is_testnet(self) -> bool {
        matches!(self, Self::Testnet)
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mainnet => f.write_str("mainnet"),
            Self::Testnet => f.write_str("testnet"),
        }
    }
}

impl FromStr for Network {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mainnet" | "-239" => Ok(Self::Mainnet),
            "testnet" | "-3" => Ok(Self::Testnet),
            other => Err(ProtocolError::UnknownNetwork(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_ids_round_trip() {
        for network in [Network::Mainnet, Network::Testnet] {
            assert_eq!(Network::from_chain_id(network.chain_id()), Some(network));
        }
        assert_eq!(Network::from_chain_id("0"), None);
    }

    #[test]
    fn parses_names_and_chain_ids() {
        assert_eq!("Mainnet".parse::<Network>().unwrap(), Network::Mainnet);
        assert_eq!("-3".parse::<Network>().unwrap(), Network::Testnet);
        assert!("regtest".parse::<Network>().is_err());
    }
}
