//! Protocol-level error type.

use std::fmt;

/// Errors from decoding wire data: addresses, BOCs, links, and JSON envelopes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A TON address failed to parse (bad length, encoding, or checksum).
    InvalidAddress(&'static str),

    /// A bag-of-cells blob is malformed.
    InvalidBoc(&'static str),

    /// A connect link or query string is malformed.
    InvalidLink(String),

    /// A JSON document did not match the expected shape.
    Json(String),

    /// The network name or chain id is not recognised.
    UnknownNetwork(String),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidAddress(reason) => write!(f, "invalid address: {reason}"),
            Self::InvalidBoc(reason) => write!(f, "invalid boc: {reason}"),
            Self::InvalidLink(reason) => write!(f, "invalid connect link: {reason}"),
            Self::Json(detail) => write!(f, "json error: {detail}"),
            Self::UnknownNetwork(name) => write!(f, "unknown network: {name}"),
        }
    }
}

impl std::error::Error for ProtocolError {}

impl From<serde_json::Error> for ProtocolError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e.to_string())
    }
}
