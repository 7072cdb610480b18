//! In-process bridge for a wallet-hosted webview.
//!
//! The webview page calls into [`InjectedBridge`] directly. Nothing is
//! encrypted and nothing is queued: each call awaits the user and returns
//! its answer. Failures are always in-protocol values, never `Err`.
//!
//! The page talks through [`InjectedBridge::handle_message`]:
//!
//! ```text
//! page   -> {"id": 7, "name": "send", "args": [{...}]}
//! wallet -> {"type": "functionResponse", "invocationId": 7, "status": "fulfilled", "data": {...}}
//! ```

use std::sync::Mutex;

use config::constants::CURRENT_PROTOCOL_VERSION;
use protocol::dapp::extract_domain;
use protocol::messages::{
    ConnectEvent, ConnectEventError, ConnectEventPayload, ConnectRequest, DisconnectEvent, RpcMethod, WalletResponse,
};
use protocol::{DeviceInfo, ErrorCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::connections::{ConnectedApp, ConnectedAppConnection};
use crate::reply::create_auto_connect_reply_items;
use crate::ui::{Decision, SignDataPrompt, TransactionPrompt};
use crate::validator::{request_id, validate_rpc_request, validate_send_transaction, validate_sign_data};
use crate::{BridgeError, BridgeService};

/// Answer to `connect` and `restoreConnection`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ConnectOutcome {
    Connected(ConnectEvent),
    Error(ConnectEventError),
}

impl ConnectOutcome {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected(_))
    }
}

/// The bridge object exposed to one webview.
pub struct InjectedBridge {
    service: BridgeService,
    webview_url: String,
    /// Id of the latest `send` call; last write wins.
    current_request_id: Mutex<Option<String>>,
    cancel: Mutex<CancellationToken>,
}

impl InjectedBridge {
    /// Binds a bridge to the page at `webview_url`.
    pub fn new(service: BridgeService, webview_url: impl Into<String>) -> Self {
        let cancel = service.cancel().child_token();
        Self {
            service,
            webview_url: webview_url.into(),
            current_request_id: Mutex::new(None),
            cancel: Mutex::new(cancel),
        }
    }

    pub fn webview_url(&self) -> &str {
        &self.webview_url
    }

    pub fn device_info(&self) -> DeviceInfo {
        self.service.config().device
    }

    pub fn protocol_version(&self) -> u32 {
        CURRENT_PROTOCOL_VERSION
    }

    pub fn is_wallet_browser(&self) -> bool {
        true
    }

    pub fn current_request_id(&self) -> Option<String> {
        self.current_request_id.lock().unwrap().clone()
    }

    // -----------------------------------------------------------------------
    // Bridge calls
    // -----------------------------------------------------------------------

    /// Connects the page's dApp.
    ///
    /// An existing Injected connection for the same app is replaced, so the
    /// app never holds two.
    pub async fn connect(&self, protocol_version: u32, request: ConnectRequest) -> ConnectOutcome {
        let cancel = self.cancel_token();
        let negotiated = match self
            .service
            .negotiate(protocol_version, &request, true, &cancel)
            .await
        {
            Ok(negotiated) => negotiated,
            Err(err) => return ConnectOutcome::Error(err.with_id(self.event_id())),
        };

        let address = self.service.address();
        let app = negotiated.app(&request.manifest_url);
        let saved = self
            .service
            .connections()
            .remove_injected_connection(&address, &app.url)
            .and_then(|()| {
                self.service.connections().save_connection(
                    &address,
                    app.clone(),
                    ConnectedAppConnection::Injected {
                        reply_items: negotiated.items.clone(),
                    },
                )
            });
        if let Err(e) = saved {
            tracing::warn!(%e, app = %app.url, "injected connection not saved");
            return ConnectOutcome::Error(
                ConnectEventError::new(ErrorCode::Unknown, "Connection not saved").with_id(self.event_id()),
            );
        }

        tracing::info!(app = %app.url, "injected connection established");
        ConnectOutcome::Connected(ConnectEvent {
            id: self.event_id(),
            payload: ConnectEventPayload {
                items: negotiated.items,
                device: self.device_info(),
            },
        })
    }

    /// Silently reconnects an app that already holds an Injected connection
    /// and allows auto-connect.
    pub async fn restore_connection(&self) -> ConnectOutcome {
        match self.restorable_app() {
            Ok(Some(app)) => {
                tracing::debug!(app = %app.url, "injected connection restored");
                let signer = self.service.inner.signer.as_ref();
                ConnectOutcome::Connected(ConnectEvent {
                    id: self.event_id(),
                    payload: ConnectEventPayload {
                        items: create_auto_connect_reply_items(signer, self.service.config().network),
                        device: self.device_info(),
                    },
                })
            }
            Ok(None) => ConnectOutcome::Error(
                ConnectEventError::new(ErrorCode::UnknownApp, "Unknown app").with_id(self.event_id()),
            ),
            Err(e) => {
                tracing::warn!(%e, url = %self.webview_url, "restore lookup failed");
                ConnectOutcome::Error(ConnectEventError::new(ErrorCode::Unknown, e.to_string()).with_id(self.event_id()))
            }
        }
    }

    /// Drops the page's Injected connection. Prompts still open resolve as
    /// rejections.
    pub async fn disconnect(&self) {
        self.reset_cancel();
        let address = self.service.address();
        if let Err(e) = self
            .service
            .connections()
            .remove_injected_connection(&address, &self.webview_url)
        {
            tracing::warn!(%e, url = %self.webview_url, "injected connection not removed");
        }
    }

    /// Handles an RPC request from the page.
    pub async fn send(&self, request: Value) -> WalletResponse {
        let id = request_id(&request).unwrap_or_default();
        *self.current_request_id.lock().unwrap() = Some(id.clone());

        let rpc = match validate_rpc_request(&request) {
            Ok(rpc) => rpc,
            Err(rejection) => return WalletResponse::error(id, rejection.code, rejection.message),
        };
        let app = match self.service.connections().get_app(&self.service.address(), &self.webview_url) {
            Ok(Some(app)) => app,
            Ok(None) => return WalletResponse::error(id, ErrorCode::UnknownApp, "Unknown app"),
            Err(e) => {
                tracing::warn!(%e, url = %self.webview_url, "app lookup failed");
                return WalletResponse::error(id, ErrorCode::Unknown, e.to_string());
            }
        };

        match rpc.method {
            RpcMethod::SendTransaction => self.send_transaction(app, id, &rpc.params).await,
            RpcMethod::SignData => self.sign_data(app, id, &rpc.params).await,
            other => WalletResponse::error(
                id,
                ErrorCode::BadRequest,
                format!("Method \"{other}\" is not supported"),
            ),
        }
    }

    /// Disconnects the page's app from the wallet side and returns the event
    /// to push into the page.
    pub async fn wallet_disconnect(&self) -> Result<DisconnectEvent, BridgeError> {
        self.reset_cancel();
        self.service.disconnect(&self.webview_url).await?;
        Ok(DisconnectEvent::new(self.event_id()))
    }

    async fn send_transaction(&self, app: ConnectedApp, id: String, params: &[String]) -> WalletResponse {
        let transaction = match validate_send_transaction(params, &self.service.validation_context()) {
            Ok(transaction) => transaction,
            Err(rejection) => return WalletResponse::error(id, rejection.code, rejection.message),
        };
        let prompt = TransactionPrompt {
            app,
            request_id: id.clone(),
            transaction,
        };
        let cancel = self.cancel_token();
        let decision = tokio::select! {
            _ = cancel.cancelled() => Decision::Reject,
            d = self.service.inner.ui.approve_transaction(&prompt) => d,
        };
        match decision {
            Decision::Approve(boc) => WalletResponse::success(id, boc),
            Decision::Reject => WalletResponse::error(id, ErrorCode::UserRejects, "User rejected the request"),
        }
    }

    async fn sign_data(&self, app: ConnectedApp, id: String, params: &[String]) -> WalletResponse {
        let payload = match validate_sign_data(params) {
            Ok(payload) => payload,
            Err(rejection) => return WalletResponse::error(id, rejection.code, rejection.message),
        };
        let kind = payload.kind();
        if !self.device_info().supports_sign_data(kind) {
            return WalletResponse::error(
                id,
                ErrorCode::MethodNotSupported,
                format!("Sign data type \"{}\" is not supported", kind.as_str()),
            );
        }

        let domain = extract_domain(&app.url);
        let prompt = SignDataPrompt {
            app,
            request_id: id.clone(),
            payload,
        };
        let cancel = self.cancel_token();
        let decision = tokio::select! {
            _ = cancel.cancelled() => Decision::Reject,
            d = self.service.inner.ui.approve_sign_data(&prompt) => d,
        };
        if decision == Decision::Reject {
            return WalletResponse::error(id, ErrorCode::UserRejects, "User rejected the request");
        }

        let signed = self
            .service
            .sign_data(&prompt.payload, &domain)
            .and_then(|result| serde_json::to_value(result).map_err(|e| BridgeError::Protocol(e.into())));
        match signed {
            Ok(result) => WalletResponse::success(id, result),
            Err(e) => {
                tracing::warn!(%e, "signData failed");
                WalletResponse::error(id, ErrorCode::Unknown, e.to_string())
            }
        }
    }

    // -----------------------------------------------------------------------
    // Webview message boundary
    // -----------------------------------------------------------------------

    /// Dispatches one page message and returns the serialized response.
    pub async fn handle_message(&self, message: &str) -> String {
        let invocation: Invocation = match serde_json::from_str(message) {
            Ok(invocation) => invocation,
            Err(e) => {
                tracing::debug!(%e, "malformed webview message");
                return FunctionResponse::rejected(Value::Null, "malformed message").to_json();
            }
        };
        let args = &invocation.args;

        let data = match invocation.name.as_str() {
            "connect" => {
                let version = args
                    .first()
                    .and_then(Value::as_u64)
                    .and_then(|v| u32::try_from(v).ok())
                    .unwrap_or_default();
                let outcome = match args.get(1).cloned().map(serde_json::from_value::<ConnectRequest>) {
                    Some(Ok(request)) => self.connect(version, request).await,
                    _ => ConnectOutcome::Error(ConnectEventError::new(ErrorCode::BadRequest, "Wrong request data")),
                };
                serde_json::to_value(outcome)
            }
            "restoreConnection" => serde_json::to_value(self.restore_connection().await),
            "disconnect" => {
                self.disconnect().await;
                Ok(Value::Null)
            }
            "send" => {
                let request = args.first().cloned().unwrap_or(Value::Null);
                serde_json::to_value(self.send(request).await)
            }
            other => {
                return FunctionResponse::rejected(invocation.id, &format!("unknown method {other}")).to_json();
            }
        };

        match data {
            Ok(data) => FunctionResponse::fulfilled(invocation.id, data).to_json(),
            Err(e) => FunctionResponse::rejected(invocation.id, &e.to_string()).to_json(),
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn restorable_app(&self) -> Result<Option<ConnectedApp>, BridgeError> {
        let address = self.service.address();
        let Some(app) = self.service.connections().get_app(&address, &self.webview_url)? else {
            return Ok(None);
        };
        if app.auto_connect_disabled {
            return Ok(None);
        }
        let connections = self.service.connections().app_connections(&address, &app.url)?;
        Ok(connections.iter().any(ConnectedAppConnection::is_injected).then_some(app))
    }

    fn cancel_token(&self) -> CancellationToken {
        self.cancel.lock().unwrap().clone()
    }

    /// Cancels open prompts and arms a fresh token for later calls.
    fn reset_cancel(&self) {
        let mut cancel = self.cancel.lock().unwrap();
        cancel.cancel();
        *cancel = self.service.cancel().child_token();
    }

    /// Event id derived from the current request id, when numeric.
    fn event_id(&self) -> Option<u64> {
        self.current_request_id().and_then(|id| id.parse().ok())
    }
}

#[derive(Debug, Deserialize)]
struct Invocation {
    #[serde(default)]
    id: Value,
    name: String,
    #[serde(default)]
    args: Vec<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FunctionResponse {
    #[serde(rename = "type")]
    kind: &'static str,
    invocation_id: Value,
    status: &'static str,
    data: Value,
}

impl FunctionResponse {
    fn fulfilled(invocation_id: Value, data: Value) -> Self {
        Self {
            kind: "functionResponse",
            invocation_id,
            status: "fulfilled",
            data,
        }
    }

    fn rejected(invocation_id: Value, reason: &str) -> Self {
        Self {
            kind: "functionResponse",
            invocation_id,
            status: "rejected",
            data: Value::String(reason.to_string()),
        }
    }

    fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
