//! Key-value storage areas backing the key store
//!
//! A storage area is shared by every handle that clones its `Arc`, the way
//! browser-local storage is shared by every tab of one origin. Each mutation
//! that changes a value is announced to all subscribers.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock};

use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::{Error, Result};

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Notification that one storage slot changed value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageChange {
    pub key: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

/// Injectable key-value storage
///
/// Mirrors the browser storage contract: string keys and values, no typed
/// errors beyond write failures.
pub trait KeyValueStorage: Send + Sync {
    fn get_item(&self, key: &str) -> Option<String>;

    /// Store a value. Fails when the area is over quota or unwritable.
    fn set_item(&self, key: &str, value: &str) -> Result<()>;

    fn remove_item(&self, key: &str) -> Result<()>;

    /// All keys currently present
    fn keys(&self) -> Vec<String>;

    /// Receive a `StorageChange` for every subsequent mutation that changed a value
    fn subscribe(&self) -> broadcast::Receiver<StorageChange>;
}

fn announce(tx: &broadcast::Sender<StorageChange>, key: &str, old: Option<String>, new: Option<String>) {
    if old == new {
        return;
    }
    debug!(key = key, removed = new.is_none(), "Storage slot changed");
    // No subscribers is fine
    let _ = tx.send(StorageChange {
        key: key.to_string(),
        old_value: old,
        new_value: new,
    });
}

// ========================================
// In-memory storage
// ========================================

/// In-memory storage area with an optional byte quota
///
/// The quota counts key and value bytes of every stored item, like the
/// per-origin limit of browser storage.
pub struct MemoryStorage {
    items: RwLock<BTreeMap<String, String>>,
    quota_bytes: Option<usize>,
    changes: broadcast::Sender<StorageChange>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            items: RwLock::new(BTreeMap::new()),
            quota_bytes: None,
            changes,
        }
    }

    /// Storage area that refuses writes beyond `quota_bytes`
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            quota_bytes: Some(quota_bytes),
            ..Self::new()
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        let items = self.items.read().unwrap_or_else(PoisonError::into_inner);
        items.get(key).cloned()
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let old = {
            let mut items = self.items.write().unwrap_or_else(PoisonError::into_inner);
            if let Some(quota) = self.quota_bytes {
                let used: usize = items
                    .iter()
                    .filter(|(k, _)| k.as_str() != key)
                    .map(|(k, v)| k.len() + v.len())
                    .sum();
                if used + key.len() + value.len() > quota {
                    return Err(Error::Storage(format!(
                        "Quota of {} bytes exceeded writing '{}'",
                        quota, key
                    )));
                }
            }
            items.insert(key.to_string(), value.to_string())
        };
        announce(&self.changes, key, old, Some(value.to_string()));
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        let old = {
            let mut items = self.items.write().unwrap_or_else(PoisonError::into_inner);
            items.remove(key)
        };
        announce(&self.changes, key, old, None);
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        let items = self.items.read().unwrap_or_else(PoisonError::into_inner);
        items.keys().cloned().collect()
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageChange> {
        self.changes.subscribe()
    }
}

// ========================================
// File-backed storage
// ========================================

/// Storage area persisted as a flat TOML table
///
/// Every read goes to disk so that other processes sharing the file observe
/// each other's writes. Writes are atomic (temp file + rename) and the file is
/// restricted to the owner on Unix.
pub struct FileStorage {
    path: PathBuf,
    write_lock: Mutex<()>,
    changes: broadcast::Sender<StorageChange>,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
            changes,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => toml::from_str(&content)
                .map_err(|e| Error::Storage(format!("Corrupt storage file {:?}: {}", self.path, e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn persist(&self, items: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let content = toml::to_string(items)
            .map_err(|e| Error::Storage(format!("Failed to serialize storage: {}", e)))?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        std::fs::write(&tmp, content)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))?;
        }
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn mutate(&self, key: &str, value: Option<&str>) -> Result<()> {
        let old = {
            let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
            let mut items = self.load()?;
            let old = match value {
                Some(v) => items.insert(key.to_string(), v.to_string()),
                None => items.remove(key),
            };
            if old.as_deref() != value {
                self.persist(&items)?;
            }
            old
        };
        announce(&self.changes, key, old, value.map(str::to_string));
        Ok(())
    }
}

impl KeyValueStorage for FileStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        match self.load() {
            Ok(items) => items.get(key).cloned(),
            Err(e) => {
                warn!("Failed to read storage file {:?}: {}", self.path, e);
                None
            }
        }
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.mutate(key, Some(value))
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.mutate(key, None)
    }

    fn keys(&self) -> Vec<String> {
        self.load()
            .map(|items| items.into_keys().collect())
            .unwrap_or_default()
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageChange> {
        self.changes.subscribe()
    }
}
