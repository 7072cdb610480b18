//! Connected apps and their transport bindings, per wallet address.
//!
//! Two documents are persisted for every wallet address:
//!
//! | Key | Value |
//! |-----|-------|
//! | `{address}/tonconnect.extensions` | [`AppMap`]: app key to [`ConnectedApp`] |
//! | `{address}/connectConnectedApps` | [`ConnectionMap`]: app key to connection list |
//!
//! The app key is [`extension_key`] of the app URL. The two maps are mutated
//! independently, so consumers only ever see the derived view computed by
//! [`filter_live_connections`]: connections whose app still exists.
//!
//! Every write publishes a [`StoreChange`] on a broadcast channel. The relay
//! watcher uses it to resubscribe when the set of remote sessions changes.

use std::collections::BTreeMap;
use std::sync::Arc;

use bridge_crypto::SessionKeyPair;
use protocol::dapp::{extension_key, url_matches_app};
use protocol::messages::ConnectItemReply;
use serde::{Deserialize, Serialize};
use storage::{KeyValueStore, read_json, write_json};
use tokio::sync::broadcast;

use crate::BridgeError;
use crate::utils::AddressLocks;

const APPS_SUFFIX: &str = "tonconnect.extensions";
const CONNECTIONS_SUFFIX: &str = "connectConnectedApps";
const CHANGE_CHANNEL_CAPACITY: usize = 64;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A dApp the wallet agreed to talk to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedApp {
    pub url: String,
    pub name: String,
    pub icon_url: String,
    #[serde(default)]
    pub manifest_url: String,
    #[serde(default)]
    pub auto_connect_disabled: bool,
    /// Last update, unix seconds.
    #[serde(default)]
    pub date: u64,
}

impl ConnectedApp {
    /// Storage key of this app.
    pub fn key(&self) -> String {
        extension_key(&self.url)
    }
}

/// One transport binding of a connected app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum ConnectedAppConnection {
    /// Relay-mediated session.
    Remote {
        session_key_pair: SessionKeyPair,
        client_session_id: String,
        reply_items: Vec<ConnectItemReply>,
    },
    /// In-process webview binding.
    Injected { reply_items: Vec<ConnectItemReply> },
}

impl ConnectedAppConnection {
    pub fn is_injected(&self) -> bool {
        matches!(self, Self::Injected { .. })
    }

    pub fn client_session_id(&self) -> Option<&str> {
        match self {
            Self::Remote {
                client_session_id, ..
            } => Some(client_session_id),
            Self::Injected { .. } => None,
        }
    }

    pub fn reply_items(&self) -> &[ConnectItemReply] {
        match self {
            Self::Remote { reply_items, .. } | Self::Injected { reply_items } => reply_items,
        }
    }
}

/// App key to app metadata.
pub type AppMap = BTreeMap<String, ConnectedApp>;

/// App key to the app's connections.
pub type ConnectionMap = BTreeMap<String, Vec<ConnectedAppConnection>>;

/// A remote connection with the app that owns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSession {
    pub app_key: String,
    /// `None` when the app was removed but the connection record remains.
    pub app: Option<ConnectedApp>,
    pub session_key_pair: SessionKeyPair,
    pub client_session_id: String,
}

/// Which document a write touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Apps,
    Connections,
}

/// Published after every successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreChange {
    pub address: String,
    pub kind: ChangeKind,
}

// ---------------------------------------------------------------------------
// Derived views
// ---------------------------------------------------------------------------

/// Keeps only connections whose app key is present in `apps`.
pub fn filter_live_connections(apps: &AppMap, connections: &ConnectionMap) -> ConnectionMap {
    connections
        .iter()
        .filter(|(key, list)| apps.contains_key(*key) && !list.is_empty())
        .map(|(key, list)| (key.clone(), list.clone()))
        .collect()
}

/// Finds the app registered for `url`.
pub fn find_app<'a>(apps: &'a AppMap, url: &str) -> Option<&'a ConnectedApp> {
    apps.values().find(|app| url_matches_app(url, &app.url))
}

/// Every remote connection in `connections`, paired with its app.
pub fn remote_sessions(apps: &AppMap, connections: &ConnectionMap) -> Vec<RemoteSession> {
    let mut out = Vec::new();
    for (key, list) in connections {
        for connection in list {
            if let ConnectedAppConnection::Remote {
                session_key_pair,
                client_session_id,
                ..
            } = connection
            {
                out.push(RemoteSession {
                    app_key: key.clone(),
                    app: apps.get(key).cloned(),
                    session_key_pair: session_key_pair.clone(),
                    client_session_id: client_session_id.clone(),
                });
            }
        }
    }
    out
}

// ---------------------------------------------------------------------------
// ConnectionStore
// ---------------------------------------------------------------------------

/// Durable map of connected apps and their connections.
pub struct ConnectionStore {
    kv: Arc<dyn KeyValueStore>,
    locks: AddressLocks,
    changes: broadcast::Sender<StoreChange>,
}

impl ConnectionStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            kv,
            locks: AddressLocks::default(),
            changes,
        }
    }

    /// Receives every subsequent [`StoreChange`].
    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    /// All connected apps of `address`.
    pub fn apps(&self, address: &str) -> Result<AppMap, BridgeError> {
        Ok(read_json(self.kv.as_ref(), &apps_key(address))?.unwrap_or_default())
    }

    /// Persisted connections, including orphans.
    pub fn all_connections(&self, address: &str) -> Result<ConnectionMap, BridgeError> {
        Ok(read_json(self.kv.as_ref(), &connections_key(address))?.unwrap_or_default())
    }

    /// Connections whose app still exists.
    pub fn connections(&self, address: &str) -> Result<ConnectionMap, BridgeError> {
        let apps = self.apps(address)?;
        let connections = self.all_connections(address)?;
        Ok(filter_live_connections(&apps, &connections))
    }

    /// The app registered for `url`, matched by trailing-slash-insensitive
    /// prefix.
    pub fn get_app(&self, address: &str, url: &str) -> Result<Option<ConnectedApp>, BridgeError> {
        let apps = self.apps(address)?;
        Ok(find_app(&apps, url).cloned())
    }

    /// Live connections of the app registered for `url`.
    pub fn app_connections(
        &self,
        address: &str,
        url: &str,
    ) -> Result<Vec<ConnectedAppConnection>, BridgeError> {
        let apps = self.apps(address)?;
        let Some(app) = find_app(&apps, url) else {
            return Ok(Vec::new());
        };
        let mut connections = self.all_connections(address)?;
        Ok(connections.remove(&app.key()).unwrap_or_default())
    }

    /// Upserts `app` and appends `connection` to its list.
    ///
    /// Connections are not deduplicated here. A connection list left behind
    /// by a removed app is discarded when the app is saved again.
    pub fn save_connection(
        &self,
        address: &str,
        app: ConnectedApp,
        connection: ConnectedAppConnection,
    ) -> Result<(), BridgeError> {
        let lock = self.locks.for_address(address);
        let _guard = lock.lock().unwrap();

        let mut apps = self.apps(address)?;
        let mut connections = self.all_connections(address)?;
        let key = app.key();

        if !apps.contains_key(&key) {
            connections.remove(&key);
        }
        apps.insert(key.clone(), app);
        connections.entry(key).or_default().push(connection);

        write_json(self.kv.as_ref(), &apps_key(address), &apps)?;
        write_json(self.kv.as_ref(), &connections_key(address), &connections)?;
        self.publish(address, ChangeKind::Apps);
        self.publish(address, ChangeKind::Connections);
        Ok(())
    }

    /// Deletes the app registered for `url`. Its connections become orphans
    /// and drop out of [`connections`](Self::connections).
    ///
    /// Returns the removed app.
    pub fn remove_app(&self, address: &str, url: &str) -> Result<Option<ConnectedApp>, BridgeError> {
        let lock = self.locks.for_address(address);
        let _guard = lock.lock().unwrap();

        let mut apps = self.apps(address)?;
        let Some(key) = find_app(&apps, url).map(ConnectedApp::key) else {
            return Ok(None);
        };
        let removed = apps.remove(&key);
        write_json(self.kv.as_ref(), &apps_key(address), &apps)?;
        self.publish(address, ChangeKind::Apps);
        Ok(removed)
    }

    /// Strips injected connections of the app registered for `url`; remote
    /// ones stay.
    pub fn remove_injected_connection(&self, address: &str, url: &str) -> Result<(), BridgeError> {
        let Some(app) = self.get_app(address, url)? else {
            return Ok(());
        };
        let key = app.key();
        self.update_connections(address, |connections| {
            let Some(list) = connections.get_mut(&key) else {
                return false;
            };
            let before = list.len();
            list.retain(|c| !c.is_injected());
            before != list.len()
        })
    }

    /// Drops the remote connection bound to `client_session_id`, whatever app
    /// owns it.
    pub fn remove_remote_connection(&self, address: &str, client_session_id: &str) -> Result<(), BridgeError> {
        self.update_connections(address, |connections| {
            let mut changed = false;
            for list in connections.values_mut() {
                let before = list.len();
                list.retain(|c| c.client_session_id() != Some(client_session_id));
                changed |= before != list.len();
            }
            changed
        })
    }

    /// The remote connection bound to `client_session_id`, searched in the
    /// persisted map so a removed app can still be answered.
    pub fn find_by_client_session_id(
        &self,
        address: &str,
        client_session_id: &str,
    ) -> Result<Option<RemoteSession>, BridgeError> {
        let apps = self.apps(address)?;
        let connections = self.all_connections(address)?;
        Ok(remote_sessions(&apps, &connections)
            .into_iter()
            .find(|s| s.client_session_id == client_session_id))
    }

    /// Remote connections of live apps.
    pub fn remote_connections(&self, address: &str) -> Result<Vec<RemoteSession>, BridgeError> {
        let apps = self.apps(address)?;
        let connections = filter_live_connections(&apps, &self.all_connections(address)?);
        Ok(remote_sessions(&apps, &connections))
    }

    /// Applies `mutate` under the address lock and persists the map when it
    /// reports a change. Emptied lists are dropped.
    fn update_connections<F>(&self, address: &str, mutate: F) -> Result<(), BridgeError>
    where
        F: FnOnce(&mut ConnectionMap) -> bool,
    {
        let lock = self.locks.for_address(address);
        let _guard = lock.lock().unwrap();

        let mut connections = self.all_connections(address)?;
        if !mutate(&mut connections) {
            return Ok(());
        }
        connections.retain(|_, list| !list.is_empty());
        write_json(self.kv.as_ref(), &connections_key(address), &connections)?;
        self.publish(address, ChangeKind::Connections);
        Ok(())
    }

    fn publish(&self, address: &str, kind: ChangeKind) {
        // No receivers is fine.
        let _ = self.changes.send(StoreChange {
            address: address.to_string(),
            kind,
        });
    }
}

fn apps_key(address: &str) -> String {
    format!("{address}/{APPS_SUFFIX}")
}

fn connections_key(address: &str) -> String {
    format!("{address}/{CONNECTIONS_SUFFIX}")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_crypto::SessionCrypto;
    use storage::InMemoryKeyValueStore;

    const WALLET: &str = "0:abc";

    fn store() -> ConnectionStore {
        ConnectionStore::new(Arc::new(InMemoryKeyValueStore::new()))
    }

    fn app(url: &str) -> ConnectedApp {
        ConnectedApp {
            url: url.to_string(),
            name: "Good".into(),
            icon_url: format!("{url}/icon.png"),
            manifest_url: format!("{url}/tonconnect-manifest.json"),
            auto_connect_disabled: false,
            date: 1,
        }
    }

    fn remote(client: &str) -> ConnectedAppConnection {
        ConnectedAppConnection::Remote {
            session_key_pair: SessionCrypto::new().stringify_keypair(),
            client_session_id: client.to_string(),
            reply_items: vec![],
        }
    }

    fn injected() -> ConnectedAppConnection {
        ConnectedAppConnection::Injected { reply_items: vec![] }
    }

    #[test]
    fn save_and_lookup_by_prefix() {
        let store = store();
        store.save_connection(WALLET, app("https://good.app"), injected()).unwrap();

        assert!(store.get_app(WALLET, "https://good.app/").unwrap().is_some());
        assert!(store.get_app(WALLET, "https://good.app/swap/ton").unwrap().is_some());
        assert!(store.get_app(WALLET, "https://other.app").unwrap().is_none());
        assert_eq!(store.app_connections(WALLET, "https://good.app").unwrap().len(), 1);
    }

    #[test]
    fn addresses_are_isolated() {
        let store = store();
        store.save_connection(WALLET, app("https://good.app"), injected()).unwrap();
        assert!(store.get_app("0:def", "https://good.app").unwrap().is_none());
        assert!(store.connections("0:def").unwrap().is_empty());
    }

    #[test]
    fn removed_app_orphans_its_connections() {
        let store = store();
        store.save_connection(WALLET, app("https://good.app"), remote("aa")).unwrap();
        store.remove_app(WALLET, "https://good.app").unwrap();

        assert!(store.connections(WALLET).unwrap().is_empty());
        assert!(store.remote_connections(WALLET).unwrap().is_empty());
        // The record itself survives until the app is saved again.
        assert_eq!(store.all_connections(WALLET).unwrap().len(), 1);
        let orphan = store.find_by_client_session_id(WALLET, "aa").unwrap().unwrap();
        assert!(orphan.app.is_none());

        store.save_connection(WALLET, app("https://good.app"), remote("bb")).unwrap();
        let ids: Vec<_> = store
            .remote_connections(WALLET)
            .unwrap()
            .into_iter()
            .map(|s| s.client_session_id)
            .collect();
        assert_eq!(ids, vec!["bb".to_string()]);
    }

    #[test]
    fn remove_injected_keeps_remote() {
        let store = store();
        store.save_connection(WALLET, app("https://good.app"), remote("aa")).unwrap();
        store.save_connection(WALLET, app("https://good.app"), injected()).unwrap();

        store.remove_injected_connection(WALLET, "https://good.app/").unwrap();
        let list = store.app_connections(WALLET, "https://good.app").unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].client_session_id(), Some("aa"));
    }

    #[test]
    fn remove_remote_by_session() {
        let store = store();
        store.save_connection(WALLET, app("https://good.app"), remote("aa")).unwrap();
        store.save_connection(WALLET, app("https://good.app"), remote("bb")).unwrap();

        store.remove_remote_connection(WALLET, "aa").unwrap();
        assert!(store.find_by_client_session_id(WALLET, "aa").unwrap().is_none());
        assert!(store.find_by_client_session_id(WALLET, "bb").unwrap().is_some());
    }

    #[test]
    fn writes_publish_changes() {
        let store = store();
        let mut rx = store.subscribe();
        store.save_connection(WALLET, app("https://good.app"), injected()).unwrap();

        let first = rx.try_recv().unwrap();
        assert_eq!(first.address, WALLET);
        assert_eq!(first.kind, ChangeKind::Apps);
        assert_eq!(rx.try_recv().unwrap().kind, ChangeKind::Connections);

        // No-op removal publishes nothing.
        store.remove_remote_connection(WALLET, "nobody").unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn live_filter_is_pure() {
        let mut apps = AppMap::new();
        let mut connections = ConnectionMap::new();
        let kept = app("https://good.app");
        connections.insert(kept.key(), vec![injected()]);
        connections.insert("gone".into(), vec![injected()]);
        apps.insert(kept.key(), kept.clone());

        let live = filter_live_connections(&apps, &connections);
        assert_eq!(live.len(), 1);
        assert!(live.contains_key(&kept.key()));
    }

    #[test]
    fn connection_json_layout() {
        let json = serde_json::to_value(ConnectedAppConnection::Remote {
            session_key_pair: SessionCrypto::new().stringify_keypair(),
            client_session_id: "aa".into(),
            reply_items: vec![],
        })
        .unwrap();
        assert_eq!(json["type"], "remote");
        assert_eq!(json["clientSessionId"], "aa");
        assert!(json["sessionKeyPair"]["publicKey"].is_string());
        assert!(json["replyItems"].is_array());

        let json = serde_json::to_value(injected()).unwrap();
        assert_eq!(json["type"], "injected");
    }
}
