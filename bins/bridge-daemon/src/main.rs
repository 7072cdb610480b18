//! Headless TonConnect wallet bridge.
//!
//! Opens the LMDB session store, starts the relay watcher for every
//! remote session, and reads operator commands from stdin (see
//! [`console`]). Relay requests are queued and answered from the console.
//!
//! # Configuration
//!
//! - `WALLET_ADDRESS` (required): the wallet's address, raw or friendly.
//! - `WALLET_SEED_HEX`: 32-byte Ed25519 seed. When unset, a fresh seed is
//!   generated for this run only and never leaves the process.
//! - `WALLET_STATE_INIT`: base64 BOC of the wallet's StateInit, sent in
//!   `ton_addr` replies.
//! - `BRIDGE_NETWORK`: `mainnet` (default) or `testnet`.
//! - `BRIDGE_URL`: relay base URL, overriding the network default.
//! - `BRIDGE_DATA_DIR`: session store directory (default `./bridge-data`).
//! - `BRIDGE_AUTO_APPROVE`: `1` approves connect requests without asking.
//!
//! ```bash
//! export WALLET_ADDRESS="0:0707070707070707070707070707070707070707070707070707070707070707"
//! RUST_LOG=info,bridge=debug cargo run --release -p bridge-daemon
//! ```

mod console;
mod kv_store;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use bridge::BridgeService;
use config::BridgeConfig;
use protocol::{Network, TonAddress};
use signer::{LocalWalletSigner, WalletSigner};
use transport::{HttpClient, HttpRelay};

use crate::console::{Command, ConsoleUi};
use crate::kv_store::HeedKeyValueStore;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_DATA_DIR: &str = "./bridge-data";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("bridge-daemon starting");

    // -----------------------------------------------------------------------
    // Wallet setup
    // -----------------------------------------------------------------------

    let network: Network = std::env::var("BRIDGE_NETWORK")
        .map(|s| s.parse().unwrap_or_else(|e| panic!("BRIDGE_NETWORK: {e}")))
        .unwrap_or(Network::Mainnet);
    let mut config = BridgeConfig::for_network(network);
    if let Ok(url) = std::env::var("BRIDGE_URL") {
        config = config.with_bridge_url(Box::leak(url.into_boxed_str()));
    }

    let address: TonAddress = std::env::var("WALLET_ADDRESS")
        .expect("WALLET_ADDRESS must be set")
        .parse()
        .unwrap_or_else(|e| panic!("WALLET_ADDRESS: {e}"));
    let state_init = std::env::var("WALLET_STATE_INIT").unwrap_or_default();
    let seed = resolve_seed("WALLET_SEED_HEX");
    let signer = LocalWalletSigner::new(&seed, address, state_init)
        .with_derived_chain_keys(&seed)
        .expect("chain keys from seed");

    tracing::info!(address = %signer.address().to_friendly(true, network == Network::Testnet), %network, "wallet ready");
    tracing::info!(public_key = hex::encode(signer.public_key()), "wallet public key");

    // -----------------------------------------------------------------------
    // Bridge init
    // -----------------------------------------------------------------------

    let data_dir = std::env::var("BRIDGE_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_DATA_DIR));
    let kv = HeedKeyValueStore::open(&data_dir).expect("open session store");
    tracing::info!(path = %data_dir.display(), "session store open");

    let client = HttpClient::new(HTTP_TIMEOUT).expect("HTTP client");
    let relay = HttpRelay::new(config.bridge_url, client.clone());
    let auto_approve = std::env::var("BRIDGE_AUTO_APPROVE").is_ok_and(|v| v == "1");

    let cancel = CancellationToken::new();
    let service = BridgeService::new(
        config,
        Arc::new(signer),
        Arc::new(kv),
        Arc::new(relay),
        Arc::new(client),
        Arc::new(ConsoleUi::new(auto_approve)),
        cancel.clone(),
    );

    // -----------------------------------------------------------------------
    // Relay watcher
    // -----------------------------------------------------------------------

    let watcher = service.start_watcher();
    match service.active_requests() {
        Ok(requests) if !requests.is_empty() => {
            tracing::info!(count = requests.len(), "pending requests from a previous run")
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(%e, "could not read pending requests"),
    }

    // -----------------------------------------------------------------------
    // Console
    // -----------------------------------------------------------------------

    let console_service = service.clone();
    let console_cancel = cancel.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = tokio::select! {
                _ = console_cancel.cancelled() => break,
                line = lines.next_line() => line,
            };
            let line = match line {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(%e, "stdin read failed");
                    break;
                }
            };
            let command = match Command::parse(&line) {
                Ok(Some(command)) => command,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!("{e}");
                    continue;
                }
            };
            match console::execute(&console_service, command).await {
                Ok(true) => {}
                Ok(false) => {
                    console_cancel.cancel();
                    break;
                }
                Err(e) => tracing::warn!(%e, "command failed"),
            }
        }
        tracing::debug!("console closed");
    });

    // -----------------------------------------------------------------------
    // Wait for shutdown
    // -----------------------------------------------------------------------

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received ctrl-c, shutting down");
            cancel.cancel();
        }
        _ = cancel.cancelled() => {}
    }

    watcher.stop().await;
    service.shutdown().await;
    tracing::info!("bridge-daemon stopped");
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Reads a hex seed from an env var, or generates a fresh one. A generated
/// seed is never logged; the wallet public key identifies it.
fn resolve_seed(env_key: &str) -> [u8; 32] {
    if let Ok(encoded) = std::env::var(env_key) {
        let bytes = hex::decode(encoded.trim()).unwrap_or_else(|e| panic!("{env_key}: {e}"));
        bytes
            .try_into()
            .unwrap_or_else(|_| panic!("{env_key} must be 32 bytes"))
    } else {
        let mut seed = [0u8; 32];
        rand_core::RngCore::fill_bytes(&mut rand_core::OsRng, &mut seed);
        tracing::warn!("{env_key} unset, using an ephemeral seed for this run");
        seed
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
