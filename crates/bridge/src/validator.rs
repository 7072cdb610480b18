//! Stateless validation of inbound RPC payloads.
//!
//! Each validator returns the typed, validated payload or a [`Rejection`]
//! carrying the error code and message to send back to the dApp.
//!
//! `sendTransaction` is deliberately lenient in one place: a message whose
//! `payload` or `stateInit` blob is not a valid BOC is logged and dropped,
//! and the rest of the request goes through.

use std::fmt;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use protocol::boc::{self, Cell};
use protocol::messages::{RpcMethod, RpcRequest};
use protocol::{ErrorCode, Network, SignDataType, TonAddress};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Rejection
// ---------------------------------------------------------------------------

/// Why a request was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub code: ErrorCode,
    pub message: String,
}

impl Rejection {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn bad_request() -> Self {
        Self::new(ErrorCode::BadRequest, "Bad request")
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

// ---------------------------------------------------------------------------
// RPC envelope
// ---------------------------------------------------------------------------

/// Validates a decrypted RPC envelope: known `method`, string or numeric
/// `id`, and `params` as an array of strings.
pub fn validate_rpc_request(value: &Value) -> Result<RpcRequest, Rejection> {
    let invalid = || Rejection::new(ErrorCode::BadRequest, "Invalid request");
    let obj = value.as_object().ok_or_else(invalid)?;

    let id = request_id(value).ok_or_else(invalid)?;
    let method = obj.get("method").and_then(Value::as_str).ok_or_else(invalid)?;
    let method = RpcMethod::parse(method).ok_or_else(|| {
        Rejection::new(
            ErrorCode::BadRequest,
            format!("Method \"{method}\" is not supported by the wallet app"),
        )
    })?;

    let params = match obj.get("params") {
        Some(Value::Array(items)) => items
            .iter()
            .map(|p| p.as_str().map(str::to_string))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(invalid)?,
        None if method == RpcMethod::Disconnect => Vec::new(),
        _ => return Err(invalid()),
    };

    Ok(RpcRequest { method, params, id })
}

/// Best-effort `id` of a JSON request, normalized to a string.
pub fn request_id(value: &Value) -> Option<String> {
    match value.get("id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// sendTransaction
// ---------------------------------------------------------------------------

/// Wallet facts a transaction is checked against.
#[derive(Debug, Clone, Copy)]
pub struct ValidationContext {
    pub network: Network,
    pub wallet: TonAddress,
    /// Unix seconds.
    pub now: u64,
    pub max_messages: u32,
}

/// One outgoing message of a transaction.
#[derive(Debug, Clone)]
pub struct TransactionMessage {
    pub address: String,
    /// Nanotons, decimal.
    pub amount: String,
    pub payload: Option<Arc<Cell>>,
    pub state_init: Option<Arc<Cell>>,
}

/// A `sendTransaction` request that passed validation.
#[derive(Debug, Clone)]
pub struct ValidatedTransaction {
    pub valid_until: u64,
    pub network: Option<Network>,
    pub from: Option<TonAddress>,
    pub messages: Vec<TransactionMessage>,
}

/// Validates `sendTransaction` parameters.
///
/// Shape rules come first (`Bad request`), then expiry (`Request timed
/// out`), then the optional `network` and `from` fields.
pub fn validate_send_transaction(
    params: &[String],
    ctx: &ValidationContext,
) -> Result<ValidatedTransaction, Rejection> {
    let obj = first_param_object(params)?;

    let valid_until = obj
        .get("valid_until")
        .and_then(Value::as_f64)
        .filter(|v| v.is_finite())
        .ok_or_else(Rejection::bad_request)?;
    let raw_messages = obj
        .get("messages")
        .and_then(Value::as_array)
        .ok_or_else(Rejection::bad_request)?;

    let mut shaped = Vec::with_capacity(raw_messages.len());
    for message in raw_messages {
        let address = non_empty_str(message, "address").ok_or_else(Rejection::bad_request)?;
        let amount = non_empty_str(message, "amount")
            .filter(|a| a.bytes().all(|b| b.is_ascii_digit()))
            .ok_or_else(Rejection::bad_request)?;
        shaped.push((address, amount, message));
    }
    if shaped.len() > ctx.max_messages as usize {
        return Err(Rejection::new(ErrorCode::BadRequest, "Too many messages"));
    }

    if valid_until < ctx.now as f64 {
        return Err(Rejection::new(ErrorCode::Timeout, "Request timed out"));
    }

    let network = match obj.get("network") {
        None | Some(Value::Null) => None,
        Some(value) => {
            let chain_id = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                _ => return Err(Rejection::new(ErrorCode::BadRequest, "Invalid network")),
            };
            match Network::from_chain_id(&chain_id) {
                Some(n) if n == ctx.network => Some(n),
                _ => return Err(Rejection::new(ErrorCode::BadRequest, "Invalid network")),
            }
        }
    };

    let from = match obj.get("from") {
        None | Some(Value::Null) => None,
        Some(value) => {
            let parsed = value.as_str().and_then(|s| TonAddress::parse(s).ok());
            match parsed {
                Some(addr) if addr == ctx.wallet => Some(addr),
                _ => return Err(Rejection::new(ErrorCode::BadRequest, "Invalid from address")),
            }
        }
    };

    let mut messages = Vec::with_capacity(shaped.len());
    for (index, (address, amount, raw)) in shaped.into_iter().enumerate() {
        let payload = match decode_cell_field(raw, "payload") {
            Ok(cell) => cell,
            Err(reason) => {
                tracing::warn!(index, %reason, "dropping message with undecodable payload");
                continue;
            }
        };
        let state_init = match decode_cell_field(raw, "stateInit") {
            Ok(cell) => cell,
            Err(reason) => {
                tracing::warn!(index, %reason, "dropping message with undecodable stateInit");
                continue;
            }
        };
        messages.push(TransactionMessage {
            address,
            amount,
            payload,
            state_init,
        });
    }

    Ok(ValidatedTransaction {
        valid_until: valid_until as u64,
        network,
        from,
        messages,
    })
}

// ---------------------------------------------------------------------------
// signData
// ---------------------------------------------------------------------------

/// A `signData` payload that passed validation.
#[derive(Debug, Clone)]
pub enum SignDataPayload {
    Text { text: String },
    Binary { bytes: Vec<u8> },
    Cell { schema: String, cell: Arc<Cell> },
}

impl SignDataPayload {
    pub fn kind(&self) -> SignDataType {
        match self {
            Self::Text { .. } => SignDataType::Text,
            Self::Binary { .. } => SignDataType::Binary,
            Self::Cell { .. } => SignDataType::Cell,
        }
    }
}

/// Validates `signData` parameters.
pub fn validate_sign_data(params: &[String]) -> Result<SignDataPayload, Rejection> {
    let obj = first_param_object(params)?;
    let invalid = |what: &str| Rejection::new(ErrorCode::BadRequest, format!("Invalid {what}"));

    match obj.get("type").and_then(Value::as_str) {
        Some("text") => {
            let text = obj
                .get("text")
                .and_then(Value::as_str)
                .filter(|t| !t.is_empty())
                .ok_or_else(|| invalid("text"))?;
            Ok(SignDataPayload::Text {
                text: text.to_string(),
            })
        }
        Some("binary") => {
            let bytes = obj
                .get("bytes")
                .and_then(Value::as_str)
                .and_then(|b| STANDARD.decode(b).ok())
                .ok_or_else(|| invalid("bytes"))?;
            Ok(SignDataPayload::Binary { bytes })
        }
        Some("cell") => {
            let schema = obj
                .get("schema")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| invalid("schema"))?;
            let cell = obj
                .get("cell")
                .and_then(Value::as_str)
                .and_then(|c| boc::parse_base64(c).ok())
                .and_then(|roots| roots.into_iter().next())
                .ok_or_else(|| invalid("cell"))?;
            Ok(SignDataPayload::Cell {
                schema: schema.to_string(),
                cell,
            })
        }
        _ => Err(invalid("type")),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn first_param_object(params: &[String]) -> Result<Map<String, Value>, Rejection> {
    let raw = params.first().ok_or_else(Rejection::bad_request)?;
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(obj)) => Ok(obj),
        _ => Err(Rejection::bad_request()),
    }
}

fn non_empty_str(value: &Value, field: &str) -> Option<String> {
    value
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Decodes an optional base64 BOC field to its first root.
fn decode_cell_field(message: &Value, field: &str) -> Result<Option<Arc<Cell>>, String> {
    let Some(raw) = message.get(field).and_then(Value::as_str) else {
        return Ok(None);
    };
    let roots = boc::parse_base64(raw).map_err(|e| e.to_string())?;
    roots
        .into_iter()
        .next()
        .map(Some)
        .ok_or_else(|| "no root cell".to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
