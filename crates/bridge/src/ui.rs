//! The host's user-facing side.
//!
//! The bridge never renders anything. It asks the host for decisions through
//! [`WalletUi`] and suspends until the returned future resolves. Futures may
//! stay pending indefinitely; the bridge races them against its own
//! cancellation and treats a cancelled prompt as a rejection.

use protocol::messages::{AppManifest, ConnectRequest};
use transport::BoxFuture;

use crate::connections::ConnectedApp;
use crate::pending::PendingRequest;
use crate::validator::{SignDataPayload, ValidatedTransaction};

/// Outcome of a user prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision<T = ()> {
    Approve(T),
    Reject,
}

/// A dApp asks to connect.
#[derive(Debug, Clone)]
pub struct ConnectPrompt {
    pub manifest: AppManifest,
    pub request: ConnectRequest,
    /// Domain proofs will be bound to.
    pub domain: String,
    /// `true` for a webview bridge, `false` for a relay session.
    pub injected: bool,
}

/// A connected dApp asks to send a transaction.
#[derive(Debug, Clone)]
pub struct TransactionPrompt {
    pub app: ConnectedApp,
    pub request_id: String,
    pub transaction: ValidatedTransaction,
}

/// A connected dApp asks to sign data.
#[derive(Debug, Clone)]
pub struct SignDataPrompt {
    pub app: ConnectedApp,
    pub request_id: String,
    pub payload: SignDataPayload,
}

/// Prompts, notifications, and toasts provided by the host.
pub trait WalletUi: Send + Sync {
    /// Asks whether to connect.
    fn approve_connect<'a>(&'a self, prompt: &'a ConnectPrompt) -> BoxFuture<'a, Decision>;

    /// Asks to sign and return a transaction. `Approve` carries the signed
    /// external message as a base64 BOC.
    fn approve_transaction<'a>(&'a self, prompt: &'a TransactionPrompt) -> BoxFuture<'a, Decision<String>>;

    /// Asks whether to sign data. The bridge signs on approval.
    fn approve_sign_data<'a>(&'a self, prompt: &'a SignDataPrompt) -> BoxFuture<'a, Decision>;

    /// A relay request was queued and awaits a decision via
    /// `BridgeService::approve_transaction`, `approve_sign_data`, or
    /// `reject`.
    fn notify_pending(&self, request: &PendingRequest);

    /// Shows a short message to the user.
    fn toast(&self, _message: &str) {}
}
