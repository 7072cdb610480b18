//! LMDB-backed [`KeyValueStore`] using heed.
//!
//! A single named database, `kv`, maps UTF-8 keys to UTF-8 values. Every
//! write commits its own transaction.

use std::fs;
use std::path::Path;

use heed::types::Str;
use heed::{Database, Env, EnvOpenOptions};
use storage::{KeyValueStore, StorageError};

const MAP_SIZE: usize = 64 * 1024 * 1024;

/// Persistent key-value store for bridge state.
pub struct HeedKeyValueStore {
    env: Env,
    db: Database<Str, Str>,
}

impl HeedKeyValueStore {
    /// Opens or creates the LMDB environment in `path`.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        fs::create_dir_all(path).map_err(|e| StorageError::Unavailable(e.to_string()))?;

        // The environment is opened once per process.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(MAP_SIZE)
                .max_dbs(1)
                .open(path)
                .map_err(unavailable)?
        };

        let mut wtxn = env.write_txn().map_err(unavailable)?;
        let db: Database<Str, Str> = env
            .create_database(&mut wtxn, Some("kv"))
            .map_err(unavailable)?;
        wtxn.commit().map_err(unavailable)?;

        Ok(Self { env, db })
    }
}

impl KeyValueStore for HeedKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let rtxn = self.env.read_txn().map_err(internal)?;
        let value = self.db.get(&rtxn, key).map_err(internal)?;
        Ok(value.map(str::to_string))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut wtxn = self.env.write_txn().map_err(internal)?;
        self.db.put(&mut wtxn, key, value).map_err(internal)?;
        wtxn.commit().map_err(internal)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut wtxn = self.env.write_txn().map_err(internal)?;
        self.db.delete(&mut wtxn, key).map_err(internal)?;
        wtxn.commit().map_err(internal)
    }
}

fn unavailable(e: heed::Error) -> StorageError {
    StorageError::Unavailable(e.to_string())
}

fn internal(e: heed::Error) -> StorageError {
    StorageError::Internal(Box::new(e))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
