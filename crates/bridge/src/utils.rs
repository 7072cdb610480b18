//! Shared helpers: wall-clock seconds and per-address locking.
//!
//! Both stores serialize read-modify-write sequences per wallet address.
//! Different addresses never contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// Current unix time in seconds.
pub(crate) fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// AddressLocks
// ---------------------------------------------------------------------------

/// One mutex per wallet address, created on first use.
#[derive(Default)]
pub(crate) struct AddressLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl AddressLocks {
    /// The lock guarding `address`. Hold its guard for the whole
    /// read-modify-write sequence.
    pub(crate) fn for_address(&self, address: &str) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .unwrap()
            .entry(address.to_string())
            .or_default()
            .clone()
    }
}
