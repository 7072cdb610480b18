//! Transport error type.

use std::fmt;

/// Errors from relay and manifest HTTP traffic.
///
/// None of these are surfaced to dApps; the bridge logs them and either
/// retries (event stream) or gives up on the single delivery (POST).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// A URL could not be built from the configured base.
    InvalidUrl(String),

    /// TLS setup failed.
    TlsFailed,

    /// The HTTP request failed before a response arrived.
    RequestFailed(String),

    /// The server answered with a non-2xx status.
    Status(u16),

    /// The response body was not what the protocol expects.
    InvalidResponse(&'static str),

    /// Reading the event stream failed mid-flight.
    Stream(String),

    /// The server closed the event stream.
    StreamClosed,

    /// The request exceeded its deadline.
    Timeout,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidUrl(url) => write!(f, "invalid url: {url}"),
            Self::TlsFailed => write!(f, "TLS setup failed"),
            Self::RequestFailed(reason) => write!(f, "request failed: {reason}"),
            Self::Status(code) => write!(f, "unexpected HTTP status {code}"),
            Self::InvalidResponse(reason) => write!(f, "invalid response: {reason}"),
            Self::Stream(reason) => write!(f, "event stream error: {reason}"),
            Self::StreamClosed => write!(f, "event stream closed by server"),
            Self::Timeout => write!(f, "request timed out"),
        }
    }
}

impl std::error::Error for TransportError {}
