//! Persistent storage for the session id.
//!
//! DESIGN
//! ======
//! The client stores exactly one string per server URL. `FileStore` keeps all
//! keys in one small JSON object so several servers can share a file; write
//! failures are logged rather than surfaced because losing the persisted id
//! only costs a fresh sign-in on the next start.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::warn;

/// Storage key for the session id of `server_url`.
#[must_use]
pub fn session_key(server_url: &str) -> String {
    format!("Serverville{server_url}SessionId")
}

/// Keyed string store.
pub trait SessionStore: Send + Sync {
    /// Stored value, with empty strings treated as absent.
    fn load(&self, key: &str) -> Option<String>;
    fn save(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
}

/// In-process store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with one key, e.g. a session id from a previous run.
    #[must_use]
    pub fn with(key: impl Into<String>, value: impl Into<String>) -> Self {
        let store = Self::new();
        store.lock().insert(key.into(), value.into());
        store
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SessionStore for MemoryStore {
    fn load(&self, key: &str) -> Option<String> {
        self.lock().get(key).filter(|v| !v.is_empty()).cloned()
    }

    fn save(&self, key: &str, value: &str) {
        self.lock().insert(key.to_owned(), value.to_owned());
    }

    fn remove(&self, key: &str) {
        self.lock().remove(key);
    }
}

/// JSON-file store.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    io: Mutex<()>,
}

impl FileStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), io: Mutex::new(()) }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> HashMap<String, String> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return HashMap::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "session store unreadable");
                return HashMap::new();
            }
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!(path = %self.path.display(), error = %e, "session store corrupt; starting empty");
            HashMap::new()
        })
    }

    fn write_all(&self, values: &HashMap<String, String>) {
        let result = serde_json::to_string_pretty(values)
            .map_err(std::io::Error::other)
            .and_then(|json| std::fs::write(&self.path, json));
        if let Err(e) = result {
            warn!(path = %self.path.display(), error = %e, "failed to write session store");
        }
    }

    fn update(&self, f: impl FnOnce(&mut HashMap<String, String>)) {
        let _io = self.io.lock().unwrap_or_else(PoisonError::into_inner);
        let mut values = self.read_all();
        f(&mut values);
        self.write_all(&values);
    }
}

impl SessionStore for FileStore {
    fn load(&self, key: &str) -> Option<String> {
        let _io = self.io.lock().unwrap_or_else(PoisonError::into_inner);
        self.read_all().remove(key).filter(|v| !v.is_empty())
    }

    fn save(&self, key: &str, value: &str) {
        self.update(|values| {
            values.insert(key.to_owned(), value.to_owned());
        });
    }

    fn remove(&self, key: &str) {
        self.update(|values| {
            values.remove(key);
        });
    }
}

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;
