//! Host decisions on queued relay requests.
//!
//! The watcher queues `sendTransaction` and `signData` requests and notifies
//! the UI. The host answers later with one of the operations here. Each one
//! removes the pending entry before responding, whether or not the response
//! reaches the relay.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bridge_crypto::SessionCrypto;
use bridge_crypto::sign_data::{PayloadKind, sign_data_digest};
use protocol::dapp::extract_domain;
use protocol::messages::{SignDataResult, WalletResponse};
use protocol::{ErrorCode, boc};
use serde_json::json;

use crate::pending::PendingRequest;
use crate::utils::now_secs;
use crate::validator::{SignDataPayload, validate_sign_data};
use crate::{BridgeError, BridgeService};

impl BridgeService {
    /// Answers a pending `sendTransaction` with the signed external message.
    ///
    /// `boc` must decode as a bag of cells; otherwise the request stays
    /// pending and the error is returned.
    pub async fn approve_transaction(&self, from: &str, boc: &str) -> Result<(), BridgeError> {
        boc::parse_base64(boc)?;
        let request = self.take_pending(from)?;
        self.respond(from, &WalletResponse::success(request.id, boc))
            .await;
        Ok(())
    }

    /// Signs a pending `signData` payload and answers with the result.
    ///
    /// The signature binds the app's domain, the wallet address, and the
    /// current time.
    pub async fn approve_sign_data(&self, from: &str) -> Result<SignDataResult, BridgeError> {
        let address = self.address();
        let request = self
            .inner
            .pending
            .get(&address, from)?
            .ok_or(BridgeError::RequestNotFound)?;
        let session = self
            .inner
            .connections
            .find_by_client_session_id(&address, from)?
            .ok_or(BridgeError::UnknownApp)?;
        let app = session.app.ok_or(BridgeError::UnknownApp)?;

        let payload = match validate_sign_data(&request.params) {
            Ok(payload) => payload,
            Err(rejection) => {
                self.take_pending(from)?;
                self.respond(from, &WalletResponse::error(request.id, rejection.code, &rejection.message))
                    .await;
                return Err(BridgeError::InvalidRequest(rejection.message));
            }
        };
        let result = self.sign_data(&payload, &extract_domain(&app.url))?;

        self.take_pending(from)?;
        let value = serde_json::to_value(&result).map_err(|e| BridgeError::Protocol(e.into()))?;
        self.respond(from, &WalletResponse::success(request.id, value))
            .await;
        Ok(result)
    }

    /// Declines a pending request.
    pub async fn reject(&self, from: &str) -> Result<(), BridgeError> {
        let request = self.take_pending(from)?;
        tracing::debug!(from, id = %request.id, "request declined by user");
        self.respond(
            from,
            &WalletResponse::error(request.id, ErrorCode::UserRejects, "User rejected the request"),
        )
        .await;
        Ok(())
    }

    /// Signs a `text` or `binary` payload for `domain`.
    ///
    /// # Errors
    ///
    /// [`BridgeError::UnsupportedItem`] for `cell` payloads.
    pub fn sign_data(&self, payload: &SignDataPayload, domain: &str) -> Result<SignDataResult, BridgeError> {
        let (kind, bytes, echoed) = match payload {
            SignDataPayload::Text { text } => (
                PayloadKind::Text,
                text.as_bytes(),
                json!({ "type": "text", "text": text }),
            ),
            SignDataPayload::Binary { bytes } => (
                PayloadKind::Binary,
                bytes.as_slice(),
                json!({ "type": "binary", "bytes": STANDARD.encode(bytes) }),
            ),
            SignDataPayload::Cell { .. } => {
                return Err(BridgeError::UnsupportedItem("signData cell".to_string()));
            }
        };

        let wallet = self.inner.signer.address();
        let timestamp = now_secs();
        let digest = sign_data_digest(wallet.workchain(), wallet.hash(), domain, timestamp, kind, bytes);
        let signature = self.inner.signer.sign_ton(&digest)?;

        Ok(SignDataResult {
            signature: STANDARD.encode(signature),
            address: wallet.to_raw_string(),
            timestamp,
            domain: domain.to_string(),
            payload: echoed,
        })
    }

    fn take_pending(&self, from: &str) -> Result<PendingRequest, BridgeError> {
        self.inner
            .pending
            .remove_by_from(&self.address(), from)?
            .ok_or(BridgeError::RequestNotFound)
    }

    /// Sends `response` to the client session `from`, if it is still known.
    pub(crate) async fn respond(&self, from: &str, response: &WalletResponse) {
        let session = match self
            .inner
            .connections
            .find_by_client_session_id(&self.address(), from)
        {
            Ok(Some(session)) => session,
            Ok(None) => {
                tracing::debug!(from, "response dropped: session gone");
                return;
            }
            Err(e) => {
                tracing::warn!(%e, from, "session lookup failed");
                return;
            }
        };
        match SessionCrypto::from_keypair(&session.session_key_pair) {
            Ok(crypto) => {
                self.inner.dispatcher.send(response, &crypto, from).await;
            }
            Err(e) => tracing::warn!(%e, from, "stored session key unusable"),
        }
    }
}
