//! TonConnect wallet bridge.
//!
//! The bridge is the wallet side of TonConnect: it negotiates sessions with
//! dApps, receives their requests, and sends back signed answers. Two
//! transports share one request pipeline:
//!
//! - **Remote**: an encrypted mailbox on an HTTP/SSE relay. A deep link
//!   starts the session ([`BridgeService::handle_connect_link`]), the relay
//!   watcher ([`BridgeService::start_watcher`]) receives requests, and the
//!   host answers them later through [`BridgeService::approve_transaction`],
//!   [`BridgeService::approve_sign_data`], or [`BridgeService::reject`].
//! - **Injected**: an in-process object exposed to a webview
//!   ([`InjectedBridge`]). Calls are answered directly, no encryption.
//!
//! # State
//!
//! Everything durable lives in the host's key-value store, scoped by wallet
//! address:
//!
//! - [`connections::ConnectionStore`] -- connected apps and their sessions
//! - [`pending::PendingRequestRegistry`] -- relay requests awaiting the user
//!
//! # Usage
//!
//! ```ignore
//! let service = BridgeService::new(
//!     BridgeConfig::MAINNET,
//!     Arc::new(signer),
//!     Arc::new(kv_store),
//!     Arc::new(HttpRelay::new(BridgeConfig::MAINNET.bridge_url, http.clone())),
//!     Arc::new(http),
//!     Arc::new(ui),
//!     CancellationToken::new(),
//! );
//!
//! let watcher = service.start_watcher();
//! service.handle_connect_link("tc://?v=2&id=...&r=...").await?;
//! ```

pub mod connections;
pub mod dispatcher;
pub mod error;
pub mod handshake;
pub mod injected;
pub mod manifest;
pub mod pending;
pub mod reply;
pub mod requests;
pub mod ui;
pub(crate) mod utils;
pub mod validator;
pub mod watcher;

pub use error::BridgeError;
pub use injected::{ConnectOutcome, InjectedBridge};
pub use watcher::{ReconnectScheduler, WatcherHandle, WatcherState};

use std::sync::Arc;

use config::BridgeConfig;
use signer::WalletSigner;
use storage::KeyValueStore;
use tokio_util::sync::CancellationToken;
use transport::Relay;

use crate::connections::ConnectionStore;
use crate::dispatcher::ResponseDispatcher;
use crate::manifest::{ManifestLoader, ManifestSource};
use crate::pending::{PendingRequest, PendingRequestRegistry};
use crate::ui::WalletUi;
use crate::validator::ValidationContext;

// ---------------------------------------------------------------------------
// BridgeService
// ---------------------------------------------------------------------------

/// Shared state behind every [`BridgeService`] clone.
pub(crate) struct BridgeInner {
    pub config: BridgeConfig,
    pub signer: Arc<dyn WalletSigner>,
    pub kv: Arc<dyn KeyValueStore>,
    pub connections: ConnectionStore,
    pub pending: PendingRequestRegistry,
    pub relay: Arc<dyn Relay>,
    pub dispatcher: ResponseDispatcher,
    pub manifests: ManifestLoader,
    pub ui: Arc<dyn WalletUi>,
    pub cancel: CancellationToken,
}

/// The bridge for one wallet account.
///
/// `Clone`-able (wraps an `Arc`). Construct one per wallet address; stores
/// built on the same key-value store stay isolated by address.
pub struct BridgeService {
    pub(crate) inner: Arc<BridgeInner>,
}

impl Clone for BridgeService {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl std::fmt::Debug for BridgeService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeService")
            .field("network", &self.inner.config.network)
            .field("bridge_url", &self.inner.config.bridge_url)
            .field("address", &self.address())
            .finish()
    }
}

impl BridgeService {
    /// Creates a bridge. No I/O happens until a watcher is started or a
    /// connect link is handled.
    pub fn new(
        config: BridgeConfig,
        signer: Arc<dyn WalletSigner>,
        kv: Arc<dyn KeyValueStore>,
        relay: Arc<dyn Relay>,
        manifests: Arc<dyn ManifestSource>,
        ui: Arc<dyn WalletUi>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(BridgeInner {
                config,
                connections: ConnectionStore::new(kv.clone()),
                pending: PendingRequestRegistry::new(kv.clone()),
                dispatcher: ResponseDispatcher::new(relay.clone(), config.default_ttl_secs),
                manifests: ManifestLoader::new(manifests, kv.clone()),
                signer,
                kv,
                relay,
                ui,
                cancel,
            }),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    /// Storage scope of this wallet: the raw form of its address.
    pub fn address(&self) -> String {
        self.inner.signer.address().to_raw_string()
    }

    pub fn connections(&self) -> &ConnectionStore {
        &self.inner.connections
    }

    pub fn pending(&self) -> &PendingRequestRegistry {
        &self.inner.pending
    }

    /// Pending requests whose session is still connected. This is the list
    /// to show the user.
    pub fn active_requests(&self) -> Result<Vec<PendingRequest>, BridgeError> {
        let address = self.address();
        let live = self.inner.connections.connections(&address)?;
        self.inner.pending.active(&address, &live)
    }

    pub fn cancel(&self) -> &CancellationToken {
        &self.inner.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Signals cancellation to the watcher and every pending prompt.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        tokio::task::yield_now().await;
    }

    pub(crate) fn validation_context(&self) -> ValidationContext {
        ValidationContext {
            network: self.inner.config.network,
            wallet: self.inner.signer.address(),
            now: utils::now_secs(),
            max_messages: self.inner.config.device.max_messages().unwrap_or(u32::MAX),
        }
    }
}
