//! TonConnect bridge configuration.
//!
//! This crate provides static, per-network configuration for the bridge:
//!
//! - [`BridgeConfig`] -- relay URL, message TTL, reconnect policy, device info
//! - [`constants`] -- protocol-level parameters (versions, TTL, backoff)
//! - [`DEVICE_INFO`] -- the wallet description sent with every connect event
//!
//! All data is compile-time constant (`&'static str`, `&'static [Feature]`).
//! Zero heap allocations. Types are `Copy`.
//!
//! `config` depends only on [`protocol`]. It does **not** depend on
//! transport, crypto, or any runtime crate, so it can be used freely as a
//! leaf dependency.

pub mod constants;

use std::time::Duration;

use protocol::{DeviceInfo, Feature, Network, SignDataType};

use constants::{
    APP_NAME, APP_VERSION, CURRENT_PROTOCOL_VERSION, DEFAULT_BRIDGE_URL, DEFAULT_TTL_SECS,
    MAX_MESSAGES, MAX_RECONNECT_ATTEMPTS, RECONNECT_DELAY_SECS,
};

/// Platform name in TonConnect terms.
const PLATFORM: &str = if cfg!(target_os = "macos") {
    "mac"
} else if cfg!(target_os = "windows") {
    "windows"
} else if cfg!(target_os = "ios") {
    "iphone"
} else if cfg!(target_os = "android") {
    "android"
} else {
    "linux"
};

/// Device description advertised to dApps.
pub const DEVICE_INFO: DeviceInfo = DeviceInfo {
    platform: PLATFORM,
    app_name: APP_NAME,
    app_version: APP_VERSION,
    max_protocol_version: CURRENT_PROTOCOL_VERSION,
    features: &[
        Feature::SendTransactionLegacy,
        Feature::SendTransaction {
            max_messages: MAX_MESSAGES,
        },
        Feature::SignData {
            types: &[SignDataType::Text, SignDataType::Binary],
        },
    ],
};

// ---------------------------------------------------------------------------
// BridgeConfig
// ---------------------------------------------------------------------------

/// Bridge configuration for one network.
///
/// This is `Copy` -- just pointers to static data and a few scalars.
#[derive(Debug, Clone, Copy)]
pub struct BridgeConfig {
    /// The network the wallet operates on. Decides the `network` field of
    /// `ton_addr` replies and which `sendTransaction.network` values pass.
    pub network: Network,

    /// Base URL of the HTTP/SSE relay, without a trailing slash.
    pub bridge_url: &'static str,

    /// Lifetime of relayed responses, in seconds.
    pub default_ttl_secs: u64,

    /// Delay between an event-stream failure and the next subscribe.
    pub reconnect_delay: Duration,

    /// Consecutive failed subscribes tolerated before the watcher stops.
    pub max_reconnect_attempts: u32,

    /// Device description sent in connect events.
    pub device: DeviceInfo,
}

impl BridgeConfig {
    /// Get the configuration for a specific network.
    pub const fn for_network(network: Network) -> Self {
        match network {
            Network::Mainnet => Self::MAINNET,
            Network::Testnet => Self::TESTNET,
        }
    }

    /// Returns a copy pointing at a different relay.
    pub const fn with_bridge_url(mut self, bridge_url: &'static str) -> Self {
        self.bridge_url = bridge_url;
        self
    }

    /// Returns a copy with a different reconnect delay.
    pub const fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    // -----------------------------------------------------------------------
    // Built-in network configurations
    // -----------------------------------------------------------------------

    /// Production mainnet configuration.
    pub const MAINNET: Self = Self {
        network: Network::Mainnet,
        bridge_url: DEFAULT_BRIDGE_URL,
        default_ttl_secs: DEFAULT_TTL_SECS,
        reconnect_delay: Duration::from_secs(RECONNECT_DELAY_SECS),
        max_reconnect_attempts: MAX_RECONNECT_ATTEMPTS,
        device: DEVICE_INFO,
    };

    /// Testnet configuration. Same relay, testnet chain id.
    pub const TESTNET: Self = Self {
        network: Network::Testnet,
        ..Self::MAINNET
    };
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self::MAINNET
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mainnet_config() {
        let config = BridgeConfig::for_network(Network::Mainnet);
        assert_eq!(config.network.chain_id(), "-239");
        assert_eq!(config.bridge_url, "https://bridge.tonapi.io/bridge");
        assert_eq!(config.default_ttl_secs, 300);
        assert_eq!(config.reconnect_delay, Duration::from_secs(5));
        assert_eq!(config.max_reconnect_attempts, 1000);
    }

    #[test]
    fn testnet_differs_only_in_network() {
        let config = BridgeConfig::TESTNET;
        assert_eq!(config.network, Network::Testnet);
        assert_eq!(config.bridge_url, BridgeConfig::MAINNET.bridge_url);
        assert_eq!(config.default_ttl_secs, BridgeConfig::MAINNET.default_ttl_secs);
    }

    #[test]
    fn bridge_url_is_https_without_trailing_slash() {
        for network in [Network::Mainnet, Network::Testnet] {
            let url = BridgeConfig::for_network(network).bridge_url;
            assert!(url.starts_with("https://"));
            assert!(!url.ends_with('/'));
        }
    }

    #[test]
    fn device_info_advertises_current_version() {
        assert_eq!(DEVICE_INFO.max_protocol_version, CURRENT_PROTOCOL_VERSION);
        assert_eq!(DEVICE_INFO.max_messages(), Some(MAX_MESSAGES));
        assert!(DEVICE_INFO.supports_sign_data(SignDataType::Binary));
        assert!(!DEVICE_INFO.supports_sign_data(SignDataType::Cell));
    }

    #[test]
    fn builders_override_fields() {
        let config = BridgeConfig::MAINNET
            .with_bridge_url("http://127.0.0.1:8080/bridge")
            .with_reconnect_delay(Duration::from_millis(10));
        assert_eq!(config.bridge_url, "http://127.0.0.1:8080/bridge");
        assert_eq!(config.reconnect_delay, Duration::from_millis(10));
    }

    #[test]
    fn const_fn_works_at_compile_time() {
        const CONFIG: BridgeConfig = BridgeConfig::for_network(Network::Testnet);
        assert_eq!(CONFIG.network, Network::Testnet);
    }
}
