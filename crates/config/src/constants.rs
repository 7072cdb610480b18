//! TonConnect protocol constants.
//!
//! These constants define protocol parameters for version negotiation, relay
//! message lifetime, reconnect backoff, and request limits.

/// Oldest TonConnect protocol version the wallet accepts.
pub const MIN_PROTOCOL_VERSION: u32 = 2;

/// Protocol version the wallet implements and advertises.
pub const CURRENT_PROTOCOL_VERSION: u32 = 2;

/// Default relay message lifetime in seconds.
///
/// Sent as the `ttl` query parameter on every `POST /message`.
pub const DEFAULT_TTL_SECS: u64 = 300;

/// Fixed delay before resubscribing after the event stream fails.
pub const RECONNECT_DELAY_SECS: u64 = 5;

/// Upper bound on consecutive reconnect attempts before the watcher gives up.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 1000;

/// Maximum number of messages in one `sendTransaction` request.
pub const MAX_MESSAGES: u32 = 4;

/// Process-wide storage key for the last relay event id.
pub const LAST_EVENT_ID_KEY: &str = "connect_last_event_id";

/// Public TonConnect relay operated by Tonapi.
pub const DEFAULT_BRIDGE_URL: &str = "https://bridge.tonapi.io/bridge";

/// Wallet name reported to dApps.
pub const APP_NAME: &str = "tonhub";

/// Wallet version reported to dApps.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_version_window() {
        assert!(MIN_PROTOCOL_VERSION <= CURRENT_PROTOCOL_VERSION);
    }

    #[test]
    fn test_reconnect_budget() {
        // The full retry budget spans well over an hour of fixed delays.
        assert!(RECONNECT_DELAY_SECS * u64::from(MAX_RECONNECT_ATTEMPTS) > 3600);
    }
}
