//! Relay event-stream watcher.
//!
//! One task per [`BridgeService`] keeps a single SSE subscription open for
//! every live Remote session of the wallet. The subscription names the
//! wallet's own session ids; each event's `from` picks the dApp session.
//!
//! ```text
//!   Idle ──(sessions appear)──► Subscribing ──► Streaming
//!    ▲                              ▲               │
//!    │                              │     error / EOF / set changed
//!    │                              │               ▼
//!    └──(sessions gone)───────── Reconnecting ◄─────┘
//! ```
//!
//! Any change of the session set tears the stream down and resubscribes.
//! Stream failures go through [`ReconnectScheduler`]: a fixed delay, at most
//! one armed timer, and a cap on consecutive attempts.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bridge_crypto::SessionCrypto;
use config::constants::LAST_EVENT_ID_KEY;
use futures::StreamExt;
use protocol::ErrorCode;
use protocol::messages::{RpcMethod, RpcRequest, WalletResponse};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use transport::RelayEvent;

use crate::connections::{RemoteSession, StoreChange};
use crate::pending::PendingRequest;
use crate::validator::{request_id, validate_rpc_request, validate_send_transaction, validate_sign_data};
use crate::{BridgeError, BridgeService};

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Observable lifecycle of the watcher task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    /// No remote sessions to watch.
    Idle,
    /// Opening the event stream.
    Subscribing,
    /// Receiving events.
    Streaming,
    /// Waiting for the reconnect timer.
    Reconnecting,
    /// Cancelled, or out of reconnect attempts.
    Stopped,
}

// ---------------------------------------------------------------------------
// ReconnectScheduler
// ---------------------------------------------------------------------------

/// Result of [`ReconnectScheduler::schedule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// A timer was armed.
    Scheduled,
    /// A timer is already armed; nothing changed.
    AlreadyPending,
    /// The attempt budget is spent.
    Exhausted,
}

/// Fixed-delay reconnect timer with an attempt cap.
#[derive(Debug)]
pub struct ReconnectScheduler {
    delay: Duration,
    max_attempts: u32,
    attempts: u32,
    deadline: Option<Instant>,
}

impl ReconnectScheduler {
    pub fn new(delay: Duration, max_attempts: u32) -> Self {
        Self {
            delay,
            max_attempts,
            attempts: 0,
            deadline: None,
        }
    }

    /// Arms the timer unless one is armed or the budget is spent.
    pub fn schedule(&mut self) -> Schedule {
        if self.deadline.is_some() {
            return Schedule::AlreadyPending;
        }
        if self.attempts >= self.max_attempts {
            return Schedule::Exhausted;
        }
        self.deadline = Some(Instant::now() + self.delay);
        Schedule::Scheduled
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Disarms the timer. The attempt count is kept.
    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    /// Disarms the timer and restores the full budget.
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.deadline = None;
    }

    /// Attempts fired since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Completes when the armed timer fires, counting one attempt. Never
    /// completes while disarmed. Cancel-safe.
    pub async fn fired(&mut self) {
        match self.deadline {
            Some(deadline) => {
                tokio::time::sleep_until(deadline).await;
                self.deadline = None;
                self.attempts += 1;
            }
            None => std::future::pending().await,
        }
    }
}

// ---------------------------------------------------------------------------
// WatcherHandle
// ---------------------------------------------------------------------------

/// Handle to a running watcher task.
pub struct WatcherHandle {
    state: watch::Receiver<WatcherState>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl WatcherHandle {
    pub fn state(&self) -> WatcherState {
        *self.state.borrow()
    }

    /// A receiver that observes every state change.
    pub fn subscribe_state(&self) -> watch::Receiver<WatcherState> {
        self.state.clone()
    }

    /// Stops the task and waits for it to exit.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!(%e, "watcher task failed");
        }
    }
}

// ---------------------------------------------------------------------------
// Watcher loop
// ---------------------------------------------------------------------------

/// Payload of a relay `message` event.
#[derive(Debug, Deserialize)]
struct RelayEnvelope {
    from: String,
    message: String,
}

/// How a streaming phase ended.
enum StreamEnd {
    Cancelled,
    SessionsChanged,
    Failed,
}

impl BridgeService {
    /// Spawns the watcher task. It stops with the service's cancellation
    /// token or [`WatcherHandle::stop`].
    pub fn start_watcher(&self) -> WatcherHandle {
        let cancel = self.inner.cancel.child_token();
        let (tx, rx) = watch::channel(WatcherState::Idle);
        let service = self.clone();
        let token = cancel.clone();
        let task = tokio::spawn(async move { service.run_watcher(tx, token).await });
        WatcherHandle {
            state: rx,
            cancel,
            task,
        }
    }

    async fn run_watcher(&self, state: watch::Sender<WatcherState>, cancel: CancellationToken) {
        let address = self.address();
        let mut changes = self.inner.connections.subscribe();
        let mut scheduler = ReconnectScheduler::new(
            self.inner.config.reconnect_delay,
            self.inner.config.max_reconnect_attempts,
        );

        loop {
            let ids = self.remote_session_ids();

            if ids.is_empty() {
                scheduler.cancel();
                state.send_replace(WatcherState::Idle);
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = next_change(&mut changes, &address) => continue,
                }
            }

            if scheduler.is_pending() {
                state.send_replace(WatcherState::Reconnecting);
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = next_change(&mut changes, &address) => {
                        if self.remote_session_ids() != ids {
                            scheduler.cancel();
                        }
                        continue;
                    }
                    _ = scheduler.fired() => {}
                }
            }

            state.send_replace(WatcherState::Subscribing);
            let last_event_id = self.last_event_id();
            let opened = tokio::select! {
                _ = cancel.cancelled() => break,
                r = self.inner.relay.subscribe(&ids, last_event_id.as_deref()) => r,
            };
            let end = match opened {
                Ok(stream) => {
                    scheduler.reset();
                    state.send_replace(WatcherState::Streaming);
                    tracing::info!(sessions = ids.len(), "relay stream open");
                    self.stream_events(stream, &ids, &mut changes, &address, &cancel)
                        .await
                }
                Err(e) => {
                    tracing::warn!(%e, "relay subscribe failed");
                    StreamEnd::Failed
                }
            };

            match end {
                StreamEnd::Cancelled => break,
                StreamEnd::SessionsChanged => scheduler.cancel(),
                StreamEnd::Failed => match scheduler.schedule() {
                    Schedule::Scheduled | Schedule::AlreadyPending => {}
                    Schedule::Exhausted => {
                        tracing::error!(attempts = scheduler.attempts(), "relay reconnect budget exhausted");
                        state.send_replace(WatcherState::Stopped);
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = next_change(&mut changes, &address) => scheduler.reset(),
                        }
                    }
                },
            }
        }

        state.send_replace(WatcherState::Stopped);
        tracing::debug!("relay watcher stopped");
    }

    async fn stream_events(
        &self,
        mut stream: transport::EventStream,
        ids: &[String],
        changes: &mut broadcast::Receiver<StoreChange>,
        address: &str,
        cancel: &CancellationToken,
    ) -> StreamEnd {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return StreamEnd::Cancelled,
                _ = next_change(changes, address) => {
                    if self.remote_session_ids() != ids {
                        tracing::debug!("remote sessions changed, resubscribing");
                        return StreamEnd::SessionsChanged;
                    }
                }
                next = stream.next() => match next {
                    Some(Ok(event)) => self.handle_relay_event(&event).await,
                    Some(Err(e)) => {
                        tracing::warn!(%e, "relay stream failed");
                        return StreamEnd::Failed;
                    }
                    None => {
                        tracing::debug!("relay stream ended");
                        return StreamEnd::Failed;
                    }
                },
            }
        }
    }

    /// Sorted wallet-side session ids of every live Remote connection. These
    /// are the relay mailboxes dApps post to.
    fn remote_session_ids(&self) -> Vec<String> {
        let sessions = match self.inner.connections.remote_connections(&self.address()) {
            Ok(sessions) => sessions,
            Err(e) => {
                tracing::warn!(%e, "remote sessions unreadable");
                return Vec::new();
            }
        };
        let mut ids: Vec<String> = sessions
            .iter()
            .filter_map(|s| match SessionCrypto::from_keypair(&s.session_key_pair) {
                Ok(crypto) => Some(crypto.session_id().to_string()),
                Err(e) => {
                    tracing::warn!(%e, client_session_id = %s.client_session_id, "stored session key unusable");
                    None
                }
            })
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    fn last_event_id(&self) -> Option<String> {
        self.inner.kv.get(LAST_EVENT_ID_KEY).unwrap_or_else(|e| {
            tracing::warn!(%e, "last event id unreadable");
            None
        })
    }

    // -----------------------------------------------------------------------
    // Inbound requests
    // -----------------------------------------------------------------------

    /// Processes one relay event.
    ///
    /// Events for unknown sessions and undecryptable payloads are dropped.
    /// Everything else is answered over the relay, queued for the user, or
    /// both.
    pub async fn handle_relay_event(&self, event: &RelayEvent) {
        if let Some(id) = &event.id {
            if let Err(e) = self.inner.kv.set(LAST_EVENT_ID_KEY, id) {
                tracing::warn!(%e, "last event id not persisted");
            }
        }
        if !event.is_message() {
            return;
        }

        let envelope: RelayEnvelope = match serde_json::from_str(&event.data) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::debug!(%e, "malformed relay envelope dropped");
                return;
            }
        };
        let from = envelope.from.as_str();

        let session = match self
            .inner
            .connections
            .find_by_client_session_id(&self.address(), from)
        {
            Ok(Some(session)) => session,
            Ok(None) => {
                tracing::debug!(from, "message for unknown session dropped");
                return;
            }
            Err(e) => {
                tracing::warn!(%e, from, "session lookup failed");
                return;
            }
        };
        let crypto = match SessionCrypto::from_keypair(&session.session_key_pair) {
            Ok(crypto) => crypto,
            Err(e) => {
                tracing::warn!(%e, from, "stored session key unusable");
                return;
            }
        };
        let plaintext = match STANDARD
            .decode(envelope.message.as_bytes())
            .map_err(|e| e.to_string())
            .and_then(|sealed| crypto.decrypt_from_hex(&sealed, from).map_err(|e| e.to_string()))
        {
            Ok(plaintext) => plaintext,
            Err(e) => {
                tracing::debug!(%e, from, "undecryptable message dropped");
                return;
            }
        };

        if let Some(response) = self.process_request(&session, &plaintext).await {
            self.inner.dispatcher.send(&response, &crypto, from).await;
        }
    }

    /// Validates and routes a decrypted request. Returns the immediate
    /// response, or `None` when the request was queued for the user.
    async fn process_request(&self, session: &RemoteSession, plaintext: &[u8]) -> Option<WalletResponse> {
        let from = session.client_session_id.as_str();
        let value: Value = match serde_json::from_slice(plaintext) {
            Ok(value) => value,
            Err(_) => return Some(WalletResponse::error("", ErrorCode::BadRequest, "Invalid request")),
        };
        let id = request_id(&value).unwrap_or_default();

        let request = match validate_rpc_request(&value) {
            Ok(request) => request,
            Err(rejection) => return Some(WalletResponse::error(id, rejection.code, rejection.message)),
        };
        let Some(app) = &session.app else {
            return Some(WalletResponse::error(id, ErrorCode::UnknownApp, "Unknown app"));
        };

        let address = self.address();
        match request.method {
            RpcMethod::Disconnect => {
                if let Err(e) = self.inner.connections.remove_app(&address, &app.url) {
                    tracing::warn!(%e, app = %app.url, "app removal failed");
                }
                if let Err(e) = self.inner.pending.remove_by_from(&address, from) {
                    tracing::warn!(%e, from, "pending cleanup failed");
                }
                tracing::info!(app = %app.url, "app disconnected by dApp");
                Some(WalletResponse::success(id, json!({})))
            }
            RpcMethod::SendTransaction => {
                if let Err(rejection) = validate_send_transaction(&request.params, &self.validation_context()) {
                    return Some(WalletResponse::error(id, rejection.code, rejection.message));
                }
                self.enqueue(from, request)
            }
            RpcMethod::SignData => {
                let payload = match validate_sign_data(&request.params) {
                    Ok(payload) => payload,
                    Err(rejection) => return Some(WalletResponse::error(id, rejection.code, rejection.message)),
                };
                let kind = payload.kind();
                if !self.inner.config.device.supports_sign_data(kind) {
                    return Some(WalletResponse::error(
                        id,
                        ErrorCode::MethodNotSupported,
                        format!("Sign data type \"{}\" is not supported", kind.as_str()),
                    ));
                }
                self.enqueue(from, request)
            }
        }
    }

    fn enqueue(&self, from: &str, request: RpcRequest) -> Option<WalletResponse> {
        let pending = PendingRequest {
            from: from.to_string(),
            id: request.id.clone(),
            method: request.method,
            params: request.params,
        };
        match self.inner.pending.add(&self.address(), pending.clone()) {
            Ok(()) => {
                tracing::debug!(from, id = %pending.id, method = %pending.method, "request queued");
                self.inner.ui.notify_pending(&pending);
                None
            }
            Err(BridgeError::AlreadyPending) => Some(WalletResponse::error(
                request.id,
                ErrorCode::UserRejects,
                "Request already pending",
            )),
            Err(e) => {
                tracing::warn!(%e, from, "request not queued");
                Some(WalletResponse::error(request.id, ErrorCode::Unknown, "Internal error"))
            }
        }
    }
}

/// Waits for the next store write for `address`. A lagged receiver counts
/// as a change; a closed channel never completes.
async fn next_change(changes: &mut broadcast::Receiver<StoreChange>, address: &str) {
    loop {
        match changes.recv().await {
            Ok(change) if change.address == address => return,
            Ok(_) => continue,
            Err(broadcast::error::RecvError::Lagged(_)) => return,
            Err(broadcast::error::RecvError::Closed) => std::future::pending().await,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
