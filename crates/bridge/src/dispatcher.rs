//! Best-effort delivery of wallet messages over the relay.
//!
//! Every outbound message is JSON, encrypted to the dApp's session key,
//! base64-encoded, and posted as `text/plain`. Delivery failures are logged
//! and swallowed: the wallet's decision is already final locally.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bridge_crypto::SessionCrypto;
use serde::Serialize;
use transport::Relay;

use crate::BridgeError;

/// Encrypts and posts responses and events to the relay.
pub struct ResponseDispatcher {
    relay: Arc<dyn Relay>,
    ttl_secs: u64,
}

impl ResponseDispatcher {
    pub fn new(relay: Arc<dyn Relay>, ttl_secs: u64) -> Self {
        Self { relay, ttl_secs }
    }

    /// Sends `message` with the default TTL. Returns whether the relay
    /// accepted it.
    pub async fn send<T: Serialize + ?Sized>(
        &self,
        message: &T,
        session: &SessionCrypto,
        client_session_id: &str,
    ) -> bool {
        self.send_with_ttl(message, session, client_session_id, self.ttl_secs)
            .await
    }

    /// Sends `message`, kept by the relay for `ttl_secs`.
    pub async fn send_with_ttl<T: Serialize + ?Sized>(
        &self,
        message: &T,
        session: &SessionCrypto,
        client_session_id: &str,
        ttl_secs: u64,
    ) -> bool {
        match self.try_send(message, session, client_session_id, ttl_secs).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(%e, client_session_id, "response delivery failed");
                false
            }
        }
    }

    async fn try_send<T: Serialize + ?Sized>(
        &self,
        message: &T,
        session: &SessionCrypto,
        client_session_id: &str,
        ttl_secs: u64,
    ) -> Result<(), BridgeError> {
        let json = serde_json::to_vec(message).map_err(|e| BridgeError::Protocol(e.into()))?;
        let sealed = session.encrypt_to_hex(&json, client_session_id)?;
        self.relay
            .post_message(session.session_id(), client_session_id, ttl_secs, STANDARD.encode(sealed))
            .await?;
        Ok(())
    }
}
