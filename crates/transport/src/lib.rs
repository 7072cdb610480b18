//! Relay transport for TonConnect.
//!
//! A TonConnect relay ("bridge server") is a dumb mailbox keyed by client
//! session id. Wallets and dApps talk to it over two HTTP calls:
//!
//! | Call | Purpose |
//! |------|---------|
//! | `GET {bridge}/events?client_id=a,b[&last_event_id=N]` | server-sent event stream for every listed session |
//! | `POST {bridge}/message?client_id=me&to=peer&ttl=300` | deliver one encrypted, base64 body to `peer` |
//!
//! The [`Relay`] trait abstracts both so the bridge can be tested against an
//! in-process fake; [`HttpRelay`] is the production implementation built on
//! hyper and rustls.

mod error;
mod http;
mod relay;
mod sse;

pub use error::TransportError;
pub use http::HttpClient;
pub use relay::HttpRelay;
pub use sse::SseDecoder;

use std::future::Future;
use std::pin::Pin;

use futures::Stream;

/// Boxed, `Send` future borrowed from `'a`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Stream of decoded relay events. Ends with `Err` when the connection drops.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<RelayEvent, TransportError>> + Send>>;

/// One server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayEvent {
    /// Relay-assigned event id, used as the resume cursor.
    pub id: Option<String>,
    /// Event type; `message` for wallet traffic.
    pub event: String,
    /// Raw `data:` payload.
    pub data: String,
}

impl RelayEvent {
    /// Whether this event carries a relayed message.
    pub fn is_message(&self) -> bool {
        self.event == "message"
    }
}

// ---------------------------------------------------------------------------
// Relay trait
// ---------------------------------------------------------------------------

/// Mailbox operations against a TonConnect relay.
pub trait Relay: Send + Sync {
    /// Opens one event stream covering every id in `client_ids`.
    ///
    /// `last_event_id` resumes after the given cursor; `None` receives only
    /// messages the relay still holds from now on.
    fn subscribe<'a>(
        &'a self,
        client_ids: &'a [String],
        last_event_id: Option<&'a str>,
    ) -> BoxFuture<'a, Result<EventStream, TransportError>>;

    /// Posts an already encrypted, base64-encoded body from `client_id` to
    /// `to`. The relay discards it after `ttl_secs`.
    fn post_message<'a>(
        &'a self,
        client_id: &'a str,
        to: &'a str,
        ttl_secs: u64,
        body: String,
    ) -> BoxFuture<'a, Result<(), TransportError>>;
}
