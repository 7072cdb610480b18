//! Wallet device description sent with every `connect` event.

use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

/// Kind of payload a `signData` request may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignDataType {
    Text,
    Binary,
    Cell,
}

impl SignDataType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Binary => "binary",
            Self::Cell => "cell",
        }
    }
}

/// A wallet capability advertised to dApps.
///
/// `SendTransactionLegacy` is the bare string form older dApp SDKs expect
/// alongside the object form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    SendTransactionLegacy,
    SendTransaction { max_messages: u32 },
    SignData { types: &'static [SignDataType] },
}

impl Serialize for Feature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::SendTransactionLegacy => serializer.serialize_str("SendTransaction"),
            Self::SendTransaction { max_messages } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("name", "SendTransaction")?;
                map.serialize_entry("maxMessages", max_messages)?;
                map.end()
            }
            Self::SignData { types } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("name", "SignData")?;
                map.serialize_entry("types", types)?;
                map.end()
            }
        }
    }
}

/// Static description of the wallet application.
///
/// All fields borrow static data so a `DeviceInfo` can live in a `const`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub platform: &'static str,
    pub app_name: &'static str,
    pub app_version: &'static str,
    pub max_protocol_version: u32,
    pub features: &'static [Feature],
}

impl DeviceInfo {
    /// Maximum number of messages per `sendTransaction`, if advertised.
    pub fn max_messages(&self) -> Option<u32> {
        self.features.iter().find_map(|f| match f {
            Feature::SendTransaction { max_messages } => Some(*max_messages),
            _ => None,
        })
    }

    /// Whether the wallet advertises support for this `signData` type.
    pub fn supports_sign_data(&self, ty: SignDataType) -> bool {
        self.features.iter().any(|f| match f {
            Feature::SignData { types } => types.contains(&ty),
            _ => false,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
