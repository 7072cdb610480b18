//! TonConnect message envelopes.
//!
//! Inbound (dApp to wallet): [`ConnectRequest`] and [`RpcRequest`].
//! Outbound (wallet to dApp): [`WalletResponse`], [`ConnectEvent`],
//! [`ConnectEventError`], and [`DisconnectEvent`].
//!
//! RPC parameters stay as raw JSON strings here. Interpreting them is the
//! validator's job.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::device::DeviceInfo;
use crate::error_code::ErrorCode;

// ---------------------------------------------------------------------------
// Connect request
// ---------------------------------------------------------------------------

/// One item a dApp asks for at connect time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectItem {
    pub name: String,

    /// Challenge bytes for proof items.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
}

/// The `r` parameter of a connect link, or the injected `connect` argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectRequest {
    pub manifest_url: String,
    pub items: Vec<ConnectItem>,
}

/// A dApp manifest as published at its `manifestUrl`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppManifest {
    pub url: String,
    pub name: String,
    pub icon_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terms_of_use_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privacy_policy_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Reply items
// ---------------------------------------------------------------------------

/// Domain a proof was issued for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofDomain {
    pub length_bytes: u32,
    pub value: String,
}

/// A signed domain-ownership proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofData {
    pub timestamp: u64,
    pub domain: ProofDomain,
    /// Base64 for ed25519 chains, `0x`-prefixed hex for Ethereum.
    pub signature: String,
    pub payload: String,
}

/// One element of `ConnectEvent.payload.items`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum ConnectItemReply {
    TonAddr {
        address: String,
        network: String,
        #[serde(rename = "publicKey")]
        public_key: String,
        #[serde(rename = "walletStateInit")]
        wallet_state_init: String,
    },
    TonProof {
        proof: ProofData,
    },
    SolanaProof {
        address: String,
        proof: ProofData,
    },
    EthereumProof {
        address: String,
        proof: ProofData,
    },
}

impl ConnectItemReply {
    /// The item name as it appears on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Self::TonAddr { .. } => "ton_addr",
            Self::TonProof { .. } => "ton_proof",
            Self::SolanaProof { .. } => "solana_proof",
            Self::EthereumProof { .. } => "ethereum_proof",
        }
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectEventPayload {
    pub items: Vec<ConnectItemReply>,
    pub device: DeviceInfo,
}

/// Successful connect.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename = "connect")]
pub struct ConnectEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub payload: ConnectEventPayload,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorPayload {
    pub code: u16,
    pub message: String,
}

/// Failed connect or restore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename = "connect_error")]
pub struct ConnectEventError {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub payload: ErrorPayload,
}

impl ConnectEventError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            id: None,
            payload: ErrorPayload {
                code: code.code(),
                message: message.into(),
            },
        }
    }

    pub fn with_id(mut self, id: Option<u64>) -> Self {
        self.id = id;
        self
    }
}

impl fmt::Display for ConnectEventError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "connect error {}: {}", self.payload.code, self.payload.message)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EmptyPayload {}

/// Session closed by the wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename = "disconnect")]
pub struct DisconnectEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub payload: EmptyPayload,
}

impl DisconnectEvent {
    pub fn new(id: Option<u64>) -> Self {
        Self {
            id,
            payload: EmptyPayload {},
        }
    }
}

// ---------------------------------------------------------------------------
// RPC requests
// ---------------------------------------------------------------------------

/// Methods a dApp may invoke on an established session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RpcMethod {
    SendTransaction,
    SignData,
    Disconnect,
}

impl RpcMethod {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sendTransaction" => Some(Self::SendTransaction),
            "signData" => Some(Self::SignData),
            "disconnect" => Some(Self::Disconnect),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SendTransaction => "sendTransaction",
            Self::SignData => "signData",
            Self::Disconnect => "disconnect",
        }
    }
}

impl fmt::Display for RpcMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated RPC envelope. `id` is normalized to a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub method: RpcMethod,
    pub params: Vec<String>,
    pub id: String,
}

// ---------------------------------------------------------------------------
// Wallet responses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseError {
    pub code: u16,
    pub message: String,
}

/// Answer to an [`RpcRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WalletResponse {
    Error { error: ResponseError, id: String },
    Success { result: serde_json::Value, id: String },
}

impl WalletResponse {
    pub fn success(id: impl Into<String>, result: impl Into<serde_json::Value>) -> Self {
        Self::Success {
            result: result.into(),
            id: id.into(),
        }
    }

    pub fn error(id: impl Into<String>, code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error {
            error: ResponseError {
                code: code.code(),
                message: message.into(),
            },
            id: id.into(),
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Success { id, .. } | Self::Error { id, .. } => id,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

/// Result object of a successful `signData`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignDataResult {
    /// Base64 ed25519 signature.
    pub signature: String,
    /// Raw form of the signing wallet address.
    pub address: String,
    pub timestamp: u64,
    pub domain: String,
    pub payload: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
