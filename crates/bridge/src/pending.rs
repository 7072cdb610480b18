//! Requests awaiting a user decision, per wallet address.
//!
//! Persisted as a JSON array under `{address}/connectPendingRequests`. At
//! most one request per client session (`from`) exists at a time; a second
//! one is refused, never queued or overwritten.
//!
//! Requests whose session no longer has a live remote connection are kept in
//! storage but excluded from [`PendingRequestRegistry::active`].

use std::collections::HashSet;
use std::sync::Arc;

use protocol::messages::RpcMethod;
use serde::{Deserialize, Serialize};
use storage::{KeyValueStore, read_json, write_json};

use crate::BridgeError;
use crate::connections::{ConnectedAppConnection, ConnectionMap};
use crate::utils::AddressLocks;

const PENDING_SUFFIX: &str = "connectPendingRequests";

/// A `sendTransaction` or `signData` request waiting for the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRequest {
    /// Client session id of the requesting dApp.
    pub from: String,
    pub id: String,
    pub method: RpcMethod,
    /// Raw parameters, interpreted by the validator.
    pub params: Vec<String>,
}

/// Drops requests whose `from` has no remote connection in `connections`.
///
/// Pass the live view from `ConnectionStore::connections`.
pub fn filter_active(requests: &[PendingRequest], connections: &ConnectionMap) -> Vec<PendingRequest> {
    let live: HashSet<&str> = connections
        .values()
        .flatten()
        .filter_map(ConnectedAppConnection::client_session_id)
        .collect();
    requests
        .iter()
        .filter(|r| live.contains(r.from.as_str()))
        .cloned()
        .collect()
}

// ---------------------------------------------------------------------------
// PendingRequestRegistry
// ---------------------------------------------------------------------------

/// Durable list of pending requests.
pub struct PendingRequestRegistry {
    kv: Arc<dyn KeyValueStore>,
    locks: AddressLocks,
}

impl PendingRequestRegistry {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            locks: AddressLocks::default(),
        }
    }

    /// Every persisted request, orphans included.
    pub fn list(&self, address: &str) -> Result<Vec<PendingRequest>, BridgeError> {
        Ok(read_json(self.kv.as_ref(), &pending_key(address))?.unwrap_or_default())
    }

    /// The request from `from`, if any.
    pub fn get(&self, address: &str, from: &str) -> Result<Option<PendingRequest>, BridgeError> {
        Ok(self.list(address)?.into_iter().find(|r| r.from == from))
    }

    /// Inserts `request`.
    ///
    /// # Errors
    ///
    /// [`BridgeError::AlreadyPending`] if a request from the same session is
    /// already stored. The check and the insert are one atomic step.
    pub fn add(&self, address: &str, request: PendingRequest) -> Result<(), BridgeError> {
        let lock = self.locks.for_address(address);
        let _guard = lock.lock().unwrap();

        let mut requests = self.list(address)?;
        if requests.iter().any(|r| r.from == request.from) {
            return Err(BridgeError::AlreadyPending);
        }
        requests.push(request);
        write_json(self.kv.as_ref(), &pending_key(address), &requests)?;
        Ok(())
    }

    /// Removes and returns the request from `from`.
    pub fn remove_by_from(&self, address: &str, from: &str) -> Result<Option<PendingRequest>, BridgeError> {
        let lock = self.locks.for_address(address);
        let _guard = lock.lock().unwrap();

        let mut requests = self.list(address)?;
        let Some(pos) = requests.iter().position(|r| r.from == from) else {
            return Ok(None);
        };
        let removed = requests.remove(pos);
        write_json(self.kv.as_ref(), &pending_key(address), &requests)?;
        Ok(Some(removed))
    }

    /// Requests whose session is still connected.
    pub fn active(&self, address: &str, connections: &ConnectionMap) -> Result<Vec<PendingRequest>, BridgeError> {
        Ok(filter_active(&self.list(address)?, connections))
    }
}

fn pending_key(address: &str) -> String {
    format!("{address}/{PENDING_SUFFIX}")
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

    fn registry() -> PendingRequestRegistry {
        PendingRequestRegistry::new(Arc::new(InMemoryKeyValueStore::new()))
    }

    fn request(from: &str, id: &str) -> PendingRequest {
        PendingRequest {
            from: from.into(),
            id: id.into(),
            method: RpcMethod::SendTransaction,
            params: vec!["{}".into()],
        }
    }

    #[test]
    fn second_request_from_same_session_is_refused() {
        let reg = registry();
        reg.add(WALLET, request("aa", "1")).unwrap();
        assert!(matches!(
            reg.add(WALLET, request("aa", "2")),
            Err(BridgeError::AlreadyPending)
        ));
        reg.add(WALLET, request("bb", "3")).unwrap();

        let list = reg.list(WALLET).unwrap();
        assert_eq!(list.iter().filter(|r| r.from == "aa").count(), 1);
        assert_eq!(reg.get(WALLET, "aa").unwrap().unwrap().id, "1");
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn remove_frees_the_session() {
        let reg = registry();
        reg.add(WALLET, request("aa", "1")).unwrap();
        assert_eq!(reg.remove_by_from(WALLET, "aa").unwrap().unwrap().id, "1");
        assert!(reg.remove_by_from(WALLET, "aa").unwrap().is_none());
        reg.add(WALLET, request("aa", "2")).unwrap();
    }

    #[test]
    fn active_drops_orphans() {
        let reg = registry();
        reg.add(WALLET, request("aa", "1")).unwrap();
        reg.add(WALLET, request("bb", "2")).unwrap();

        let mut live = ConnectionMap::new();
        live.insert(
            "app".into(),
            vec![ConnectedAppConnection::Remote {
                session_key_pair: SessionCrypto::new().stringify_keypair(),
                client_session_id: "bb".into(),
                reply_items: vec![],
            }],
        );
        let active = reg.active(WALLET, &live).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].from, "bb");
        // Storage is untouched.
        assert_eq!(reg.list(WALLET).unwrap().len(), 2);
    }

    #[test]
    fn persisted_layout() {
        let kv = Arc::new(InMemoryKeyValueStore::new());
        let reg = PendingRequestRegistry::new(kv.clone());
        reg.add(WALLET, request("aa", "1")).unwrap();
        let raw = kv.get("0:abc/connectPendingRequests").unwrap().unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json[0]["method"], "sendTransaction");
        assert_eq!(json[0]["from"], "aa");
    }
}
