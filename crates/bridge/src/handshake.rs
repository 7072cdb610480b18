//! Connect negotiation and the remote handshake.
//!
//! Both transports run the same checks before a connection exists:
//!
//! 1. protocol version within the supported window
//! 2. non-empty `manifestUrl` and `items`
//! 3. the manifest URL names a real domain
//! 4. manifest fetch (cache fallback)
//! 5. user approval, raced against cancellation
//! 6. reply items signed for the manifest's domain
//!
//! A failure at any step is a [`ConnectEventError`] ready to send.

use bridge_crypto::SessionCrypto;
use config::constants::MIN_PROTOCOL_VERSION;
use protocol::dapp::{extract_domain, is_valid_dapp_domain};
use protocol::messages::{
    AppManifest, ConnectEvent, ConnectEventError, ConnectEventPayload, ConnectItemReply, ConnectRequest,
    DisconnectEvent,
};
use protocol::{ConnectQrQuery, ErrorCode, ReturnStrategy};
use tokio_util::sync::CancellationToken;

use crate::connections::{ConnectedApp, ConnectedAppConnection};
use crate::reply::ConnectReplyBuilder;
use crate::ui::{ConnectPrompt, Decision};
use crate::utils::now_secs;
use crate::{BridgeError, BridgeService};

/// An approved connect request.
#[derive(Debug, Clone)]
pub struct Negotiated {
    pub manifest: AppManifest,
    pub items: Vec<ConnectItemReply>,
}

impl Negotiated {
    /// The app record to persist for this connection.
    pub fn app(&self, manifest_url: &str) -> ConnectedApp {
        ConnectedApp {
            url: self.manifest.url.clone(),
            name: self.manifest.name.clone(),
            icon_url: self.manifest.icon_url.clone(),
            manifest_url: manifest_url.to_string(),
            auto_connect_disabled: false,
            date: now_secs(),
        }
    }
}

/// How a connect link ended.
#[derive(Debug, Clone)]
pub enum HandshakeResult {
    Connected(ConnectedApp),
    Rejected(ConnectEventError),
}

/// Result of [`BridgeService::handle_connect_link`].
#[derive(Debug, Clone)]
pub struct HandshakeOutcome {
    pub client_session_id: String,
    /// Where to send the user afterwards.
    pub return_strategy: ReturnStrategy,
    pub result: HandshakeResult,
}

impl HandshakeOutcome {
    pub fn is_connected(&self) -> bool {
        matches!(self.result, HandshakeResult::Connected(_))
    }
}

/// Rejects protocol versions older than the wallet supports.
pub fn check_protocol_version(version: u32) -> Result<(), ConnectEventError> {
    if version < MIN_PROTOCOL_VERSION {
        return Err(ConnectEventError::new(
            ErrorCode::BadRequest,
            format!("Protocol version {version} is not supported by the wallet app"),
        ));
    }
    Ok(())
}

/// Checks the request shape and the manifest URL's domain.
pub fn verify_connect_request(request: &ConnectRequest) -> Result<(), ConnectEventError> {
    if request.manifest_url.trim().is_empty() || request.items.is_empty() {
        return Err(ConnectEventError::new(ErrorCode::BadRequest, "Wrong request data"));
    }
    if !is_valid_dapp_domain(&extract_domain(&request.manifest_url)) {
        return Err(ConnectEventError::new(ErrorCode::BadRequest, "Invalid dApp domain"));
    }
    Ok(())
}

impl BridgeService {
    /// Runs the checks shared by both transports and asks the user.
    ///
    /// `cancel` resolves the prompt as a rejection when it fires first.
    pub(crate) async fn negotiate(
        &self,
        protocol_version: u32,
        request: &ConnectRequest,
        injected: bool,
        cancel: &CancellationToken,
    ) -> Result<Negotiated, ConnectEventError> {
        check_protocol_version(protocol_version)?;
        verify_connect_request(request)?;

        let manifest = self.inner.manifests.load(&request.manifest_url).await?;
        let builder = ConnectReplyBuilder::new(request, &manifest, self.inner.config.network);

        let prompt = ConnectPrompt {
            manifest: manifest.clone(),
            request: request.clone(),
            domain: builder.domain(),
            injected,
        };
        let decision = tokio::select! {
            _ = cancel.cancelled() => Decision::Reject,
            d = self.inner.ui.approve_connect(&prompt) => d,
        };
        if decision == Decision::Reject {
            tracing::debug!(manifest_url = %request.manifest_url, "connect declined");
            return Err(ConnectEventError::new(ErrorCode::UserRejects, "Wallet declined the request"));
        }

        let items = builder
            .build(self.inner.signer.as_ref(), now_secs())
            .map_err(|e| {
                tracing::warn!(%e, manifest_url = %request.manifest_url, "reply items failed");
                ConnectEventError::new(ErrorCode::BadRequest, e.to_string())
            })?;

        Ok(Negotiated { manifest, items })
    }

    /// Handles a `tc://` or universal connect link end to end.
    ///
    /// A fresh session keypair is created for the dApp. On approval the
    /// Remote connection is persisted (replacing any earlier one for the
    /// same client session) and a connect event goes out over the relay;
    /// otherwise the connect error does.
    ///
    /// # Errors
    ///
    /// Only for a malformed link or a storage failure. dApp-facing failures
    /// are reported in [`HandshakeOutcome::result`].
    pub async fn handle_connect_link(&self, link: &str) -> Result<HandshakeOutcome, BridgeError> {
        let query = ConnectQrQuery::parse(link)?;
        let session = SessionCrypto::new();
        let client_session_id = query.client_session_id.clone();

        let result = match self
            .negotiate(query.version, &query.request, false, &self.inner.cancel)
            .await
        {
            Ok(negotiated) => {
                let address = self.address();
                let app = negotiated.app(&query.request.manifest_url);

                self.inner
                    .connections
                    .remove_remote_connection(&address, &client_session_id)?;
                self.inner.connections.save_connection(
                    &address,
                    app.clone(),
                    ConnectedAppConnection::Remote {
                        session_key_pair: session.stringify_keypair(),
                        client_session_id: client_session_id.clone(),
                        reply_items: negotiated.items.clone(),
                    },
                )?;

                let event = ConnectEvent {
                    id: None,
                    payload: ConnectEventPayload {
                        items: negotiated.items,
                        device: self.inner.config.device,
                    },
                };
                self.inner
                    .dispatcher
                    .send(&event, &session, &client_session_id)
                    .await;
                tracing::info!(app = %app.url, client_session_id, "remote connection established");
                HandshakeResult::Connected(app)
            }
            Err(err) => {
                self.inner
                    .dispatcher
                    .send(&err, &session, &client_session_id)
                    .await;
                HandshakeResult::Rejected(err)
            }
        };

        Ok(HandshakeOutcome {
            client_session_id,
            return_strategy: query.ret,
            result,
        })
    }

    /// Disconnects an app from the wallet side.
    ///
    /// Every Remote session of the app receives a disconnect event, then the
    /// app and its sessions' pending requests are removed. Injected sessions
    /// are told by their adapter. Unknown URLs are a no-op.
    pub async fn disconnect(&self, url: &str) -> Result<(), BridgeError> {
        let address = self.address();
        let Some(app) = self.inner.connections.get_app(&address, url)? else {
            return Ok(());
        };
        let connections = self.inner.connections.app_connections(&address, &app.url)?;

        for connection in &connections {
            let ConnectedAppConnection::Remote {
                session_key_pair,
                client_session_id,
                ..
            } = connection
            else {
                continue;
            };
            match SessionCrypto::from_keypair(session_key_pair) {
                Ok(session) => {
                    self.inner
                        .dispatcher
                        .send(&DisconnectEvent::new(None), &session, client_session_id)
                        .await;
                }
                Err(e) => tracing::warn!(%e, client_session_id, "stored session key unusable"),
            }
        }

        self.inner.connections.remove_app(&address, &app.url)?;
        for from in connections.iter().filter_map(ConnectedAppConnection::client_session_id) {
            self.inner.pending.remove_by_from(&address, from)?;
        }
        tracing::info!(app = %app.url, "app disconnected by wallet");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::messages::ConnectItem;

    fn request(manifest_url: &str, items: &[&str]) -> ConnectRequest {
        ConnectRequest {
            manifest_url: manifest_url.into(),
            items: items
                .iter()
                .map(|name| ConnectItem {
                    name: name.to_string(),
                    payload: None,
                })
                .collect(),
        }
    }

    #[test]
    fn old_protocol_versions_rejected() {
        let err = check_protocol_version(1).unwrap_err();
        assert_eq!(err.payload.code, ErrorCode::BadRequest.code());
        assert_eq!(err.payload.message, "Protocol version 1 is not supported by the wallet app");
        assert!(check_protocol_version(2).is_ok());
    }

    #[test]
    fn request_shape() {
        let err = verify_connect_request(&request("https://good.app/m.json", &[])).unwrap_err();
        assert_eq!(err.payload.message, "Wrong request data");

        let err = verify_connect_request(&request("", &["ton_addr"])).unwrap_err();
        assert_eq!(err.payload.message, "Wrong request data");

        assert!(verify_connect_request(&request("https://good.app/m.json", &["ton_addr"])).is_ok());
    }

    #[test]
    fn manifest_domain_needs_internal_dot() {
        let err = verify_connect_request(&request("http://localhost:3000/m.json", &["ton_addr"])).unwrap_err();
        assert_eq!(err.payload.message, "Invalid dApp domain");
    }

    #[test]
    fn app_record_from_manifest() {
        let negotiated = Negotiated {
            manifest: AppManifest {
                url: "https://good.app".into(),
                name: "Good".into(),
                icon_url: String::new(),
                terms_of_use_url: None,
                privacy_policy_url: None,
            },
            items: Vec::new(),
        };
        let app = negotiated.app("https://good.app/m.json");
        assert_eq!(app.url, "https://good.app");
        assert_eq!(app.manifest_url, "https://good.app/m.json");
        assert!(!app.auto_connect_disabled);
    }
}
