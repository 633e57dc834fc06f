//! Durable key-value storage that survives a restart.
//!
//! The client keeps its bearer token and user record here under
//! [`AUTH_TOKEN_KEY`](crate::paths::AUTH_TOKEN_KEY) and
//! [`AUTH_USER_KEY`](crate::paths::AUTH_USER_KEY). [`FileStorage`] keeps the
//! whole map in one JSON file rewritten atomically on every change;
//! [`MemoryStorage`] is the volatile variant used by tests and demos.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{ChurnError, Result};
use crate::io;

/// String key-value store with the semantics of browser local storage.
pub trait Storage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    /// Remove `key`; a missing key is not an error.
    fn remove(&self, key: &str) -> Result<()>;
}

/// Read `key` and deserialize it from JSON.
///
/// A value that fails to parse is reported as [`ChurnError::CorruptEntry`]
/// so callers can decide to discard it.
pub fn get_json<T: DeserializeOwned>(storage: &dyn Storage, key: &str) -> Result<Option<T>> {
    let Some(raw) = storage.get(key)? else {
        return Ok(None);
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|e| ChurnError::CorruptEntry {
            key: key.to_string(),
            reason: e.to_string(),
        })
}

/// Serialize `value` to JSON and store it under `key`.
pub fn set_json<T: Serialize>(storage: &dyn Storage, key: &str, value: &T) -> Result<()> {
    let raw = serde_json::to_string(value)?;
    storage.set(key, &raw)
}

// ---------------------------------------------------------------------------
// FileStorage
// ---------------------------------------------------------------------------

/// JSON-file backed storage at `<state_dir>/storage.json`.
pub struct FileStorage {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Storage rooted in a state directory.
    pub fn in_state_dir(state_dir: &Path) -> Self {
        Self::new(crate::paths::storage_path(state_dir))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Result<BTreeMap<String, String>> {
        match io::read_optional(&self.path)? {
            None => Ok(BTreeMap::new()),
            Some(s) if s.trim().is_empty() => Ok(BTreeMap::new()),
            Some(s) => Ok(serde_json::from_str(&s)?),
        }
    }

    /// Like `read_map`, but a file that no longer parses is logged and
    /// replaced by an empty map so writes can recover from it.
    fn read_map_for_write(&self) -> Result<BTreeMap<String, String>> {
        match self.read_map() {
            Err(ChurnError::Json(e)) => {
                tracing::warn!(path = %self.path.display(), error = %e, "storage file is corrupt; starting from empty");
                Ok(BTreeMap::new())
            }
            other => other,
        }
    }

    fn write_map(&self, map: &BTreeMap<String, String>) -> Result<()> {
        let data = serde_json::to_vec_pretty(map)?;
        tracing::debug!(path = %self.path.display(), keys = map.len(), "writing storage");
        io::atomic_write(&self.path, &data)
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        Ok(self.read_map()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut map = self.read_map_for_write()?;
        map.insert(key.to_string(), value.to_string());
        self.write_map(&map)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        match self.read_map() {
            Ok(mut map) => {
                if map.remove(key).is_some() {
                    self.write_map(&map)?;
                }
                Ok(())
            }
            Err(ChurnError::Json(_)) => {
                let map = self.read_map_for_write()?;
                self.write_map(&map)
            }
            Err(e) => Err(e),
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryStorage
// ---------------------------------------------------------------------------

/// Volatile in-process storage.
#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: Mutex::new(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_empty()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(key);
        Ok(())
    }
}
