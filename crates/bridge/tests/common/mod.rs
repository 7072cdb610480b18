//! Shared fixtures: an in-process relay, a scripted UI, and a dApp peer.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bridge::pending::PendingRequest;
use bridge::ui::{ConnectPrompt, Decision, SignDataPrompt, TransactionPrompt, WalletUi};
use bridge::BridgeService;
use bridge::manifest::ManifestSource;
use bridge_crypto::SessionCrypto;
use config::BridgeConfig;
use futures::StreamExt;
use protocol::TonAddress;
use serde_json::{Value, json};
use signer::LocalWalletSigner;
use storage::InMemoryKeyValueStore;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use transport::{BoxFuture, EventStream, Relay, RelayEvent, TransportError};
use url::form_urlencoded;

pub const EMPTY_CELL: &str = "te6ccgEBAQEAAgAAAA==";
pub const MANIFEST_URL: &str = "https://good.app/tonconnect-manifest.json";
pub const APP_URL: &str = "https://good.app";

pub fn wallet_address() -> TonAddress {
    TonAddress::new(0, [7u8; 32])
}

// ---------------------------------------------------------------------------
// MockRelay
// ---------------------------------------------------------------------------

/// A message the wallet posted.
#[derive(Debug, Clone)]
pub struct Post {
    pub client_id: String,
    pub to: String,
    pub ttl_secs: u64,
    pub body: String,
}

/// One scripted stream item.
#[derive(Debug)]
pub enum Scripted {
    /// A message posted to the mailbox `to`. Delivered only to a
    /// subscription that names `to`.
    Message { to: String, event: RelayEvent },
    /// A non-message event, delivered to any subscription.
    Event(RelayEvent),
    /// A stream failure.
    Fail(TransportError),
}

/// Records posts and serves scripted event streams. Each subscribe takes the
/// next script and keeps only the items addressed to its client ids; the
/// stream stays open after them. With no script left the stream is silent.
#[derive(Default)]
pub struct MockRelay {
    posts: Mutex<Vec<Post>>,
    scripts: Mutex<VecDeque<Vec<Scripted>>>,
    subscriptions: Mutex<Vec<(Vec<String>, Option<String>)>>,
}

impl MockRelay {
    pub fn script(&self, items: Vec<Scripted>) {
        self.scripts.lock().unwrap().push_back(items);
    }

    pub fn posts(&self) -> Vec<Post> {
        self.posts.lock().unwrap().clone()
    }

    pub fn last_post(&self) -> Post {
        self.posts().last().cloned().expect("no post")
    }

    /// Client ids and cursor of every subscribe call.
    pub fn subscriptions(&self) -> Vec<(Vec<String>, Option<String>)> {
        self.subscriptions.lock().unwrap().clone()
    }
}

impl Relay for MockRelay {
    fn subscribe<'a>(
        &'a self,
        client_ids: &'a [String],
        last_event_id: Option<&'a str>,
    ) -> BoxFuture<'a, Result<EventStream, TransportError>> {
        self.subscriptions
            .lock()
            .unwrap()
            .push((client_ids.to_vec(), last_event_id.map(str::to_string)));
        let items: Vec<Result<RelayEvent, TransportError>> = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default()
            .into_iter()
            .filter_map(|item| match item {
                Scripted::Message { to, event } => client_ids.contains(&to).then_some(Ok(event)),
                Scripted::Event(event) => Some(Ok(event)),
                Scripted::Fail(e) => Some(Err(e)),
            })
            .collect();
        Box::pin(async move {
            let stream: EventStream = Box::pin(futures::stream::iter(items).chain(futures::stream::pending()));
            Ok(stream)
        })
    }

    fn post_message<'a>(
        &'a self,
        client_id: &'a str,
        to: &'a str,
        ttl_secs: u64,
        body: String,
    ) -> BoxFuture<'a, Result<(), TransportError>> {
        self.posts.lock().unwrap().push(Post {
            client_id: client_id.to_string(),
            to: to.to_string(),
            ttl_secs,
            body,
        });
        Box::pin(async { Ok(()) })
    }
}

// ---------------------------------------------------------------------------
// Manifests
// ---------------------------------------------------------------------------

/// Serves the same manifest for every URL.
pub struct StaticManifest(pub String);

impl Default for StaticManifest {
    fn default() -> Self {
        Self(json!({ "url": APP_URL, "name": "Good App", "iconUrl": "https://good.app/icon.png" }).to_string())
    }
}

impl ManifestSource for StaticManifest {
    fn fetch<'a>(&'a self, _url: &'a str) -> BoxFuture<'a, Result<String, TransportError>> {
        let body = self.0.clone();
        Box::pin(async move { Ok(body) })
    }
}

// ---------------------------------------------------------------------------
// MockUi
// ---------------------------------------------------------------------------

/// Answers prompts from preset decisions. `None` leaves a prompt open
/// forever.
pub struct MockUi {
    pub connect: Mutex<Option<Decision>>,
    pub transaction: Mutex<Option<Decision<String>>>,
    pub sign_data: Mutex<Option<Decision>>,
    prompts: Mutex<Vec<&'static str>>,
    notified: Mutex<Vec<PendingRequest>>,
    notify: Notify,
}

impl MockUi {
    pub fn approving() -> Self {
        Self {
            connect: Mutex::new(Some(Decision::Approve(()))),
            transaction: Mutex::new(Some(Decision::Approve(EMPTY_CELL.to_string()))),
            sign_data: Mutex::new(Some(Decision::Approve(()))),
            prompts: Mutex::default(),
            notified: Mutex::default(),
            notify: Notify::new(),
        }
    }

    pub fn rejecting() -> Self {
        let ui = Self::approving();
        *ui.connect.lock().unwrap() = Some(Decision::Reject);
        *ui.transaction.lock().unwrap() = Some(Decision::Reject);
        *ui.sign_data.lock().unwrap() = Some(Decision::Reject);
        ui
    }

    /// Approves connects; leaves transaction and signData prompts open.
    pub fn stalling() -> Self {
        let ui = Self::approving();
        *ui.transaction.lock().unwrap() = None;
        *ui.sign_data.lock().unwrap() = None;
        ui
    }

    pub fn prompts(&self) -> Vec<&'static str> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn notified(&self) -> Vec<PendingRequest> {
        self.notified.lock().unwrap().clone()
    }

    /// Waits until `count` requests have been queued.
    pub async fn wait_for_notifications(&self, count: usize) -> Vec<PendingRequest> {
        loop {
            let notified = self.notified();
            if notified.len() >= count {
                return notified;
            }
            self.notify.notified().await;
        }
    }

    fn answer<T: Send + 'static>(&self, name: &'static str, decision: Option<T>) -> BoxFuture<'static, T> {
        self.prompts.lock().unwrap().push(name);
        match decision {
            Some(decision) => Box::pin(async move { decision }),
            None => Box::pin(std::future::pending()),
        }
    }
}

impl WalletUi for MockUi {
    fn approve_connect<'a>(&'a self, _prompt: &'a ConnectPrompt) -> BoxFuture<'a, Decision> {
        let decision = self.connect.lock().unwrap().clone();
        self.answer("connect", decision)
    }

    fn approve_transaction<'a>(&'a self, _prompt: &'a TransactionPrompt) -> BoxFuture<'a, Decision<String>> {
        let decision = self.transaction.lock().unwrap().clone();
        self.answer("transaction", decision)
    }

    fn approve_sign_data<'a>(&'a self, _prompt: &'a SignDataPrompt) -> BoxFuture<'a, Decision> {
        let decision = self.sign_data.lock().unwrap().clone();
        self.answer("sign_data", decision)
    }

    fn notify_pending(&self, request: &PendingRequest) {
        self.notified.lock().unwrap().push(request.clone());
        self.notify.notify_one();
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub service: BridgeService,
    pub relay: Arc<MockRelay>,
    pub ui: Arc<MockUi>,
    pub kv: Arc<InMemoryKeyValueStore>,
}

pub fn harness(ui: MockUi) -> Harness {
    harness_with_config(BridgeConfig::MAINNET, ui)
}

pub fn harness_with_config(config: BridgeConfig, ui: MockUi) -> Harness {
    let relay = Arc::new(MockRelay::default());
    let ui = Arc::new(ui);
    let kv = Arc::new(InMemoryKeyValueStore::new());
    let signer = LocalWalletSigner::new(&[1u8; 32], wallet_address(), EMPTY_CELL);
    let service = BridgeService::new(
        config,
        Arc::new(signer),
        kv.clone(),
        relay.clone(),
        Arc::new(StaticManifest::default()),
        ui.clone(),
        CancellationToken::new(),
    );
    Harness {
        service,
        relay,
        ui,
        kv,
    }
}

/// Polls `condition` every millisecond for up to a second.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("condition not reached");
}

// ---------------------------------------------------------------------------
// Dapp
// ---------------------------------------------------------------------------

/// The dApp end of a relay session.
pub struct Dapp {
    pub session: SessionCrypto,
}

impl Dapp {
    pub fn new() -> Self {
        Self {
            session: SessionCrypto::new(),
        }
    }

    pub fn id(&self) -> &str {
        self.session.session_id()
    }

    /// A `tc://` link asking for `ton_addr` and `ton_proof`.
    pub fn connect_link(&self) -> String {
        let request = json!({
            "manifestUrl": MANIFEST_URL,
            "items": [{ "name": "ton_addr" }, { "name": "ton_proof", "payload": "nonce" }],
        });
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("v", "2")
            .append_pair("id", self.id())
            .append_pair("r", &request.to_string())
            .append_pair("ret", "none")
            .finish();
        format!("tc://?{query}")
    }

    /// Encrypts `request` to the wallet and wraps it as a relay event.
    pub fn request_event(&self, wallet_session_id: &str, request: &Value, event_id: &str) -> RelayEvent {
        let sealed = self
            .session
            .encrypt_to_hex(request.to_string().as_bytes(), wallet_session_id)
            .unwrap();
        RelayEvent {
            id: Some(event_id.to_string()),
            event: "message".into(),
            data: json!({ "from": self.id(), "message": STANDARD.encode(sealed) }).to_string(),
        }
    }

    /// Like [`request_event`](Self::request_event), posted to the wallet's
    /// mailbox.
    pub fn message_to(&self, wallet_session_id: &str, request: &Value, event_id: &str) -> Scripted {
        Scripted::Message {
            to: wallet_session_id.to_string(),
            event: self.request_event(wallet_session_id, request, event_id),
        }
    }

    /// Decrypts a wallet post addressed to this dApp.
    pub fn open(&self, post: &Post) -> Value {
        assert_eq!(post.to, self.id());
        let sealed = STANDARD.decode(&post.body).unwrap();
        let plaintext = self.session.decrypt_from_hex(&sealed, &post.client_id).unwrap();
        serde_json::from_slice(&plaintext).unwrap()
    }
}

/// Connects `dapp` through a connect link and returns the wallet's session
/// id for it.
pub async fn connect_remote(h: &Harness, dapp: &Dapp) -> String {
    let outcome = h.service.handle_connect_link(&dapp.connect_link()).await.unwrap();
    assert!(outcome.is_connected());
    h.relay.last_post().client_id
}

/// A `sendTransaction` request valid until `valid_until`.
pub fn send_transaction(id: &str, valid_until: u64) -> Value {
    let params = json!({
        "valid_until": valid_until,
        "messages": [{ "address": wallet_address().to_friendly(true, false), "amount": "1000000000" }],
    });
    json!({ "method": "sendTransaction", "params": [params.to_string()], "id": id })
}
