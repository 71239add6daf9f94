//! Provider credential store
//!
//! Credentials live in named storage slots, one per provider. The primary
//! provider also mirrors its value into a legacy slot that older dashboards
//! read; lookups fall back to that slot when the primary slot is empty.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::provider::Provider;
use super::storage::{KeyValueStorage, StorageChange};

/// One configured provider credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveCredential {
    pub provider: Provider,
    pub key: String,
    pub name: &'static str,
    pub description: &'static str,
    pub storage_key: &'static str,
}

/// Aggregate key state derived from the store
///
/// Recomputed on demand, never mutated independently.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KeyState {
    pub api_keys: Vec<ActiveCredential>,
    pub count: usize,
    pub has_valid_key: bool,
    pub navigation_enabled: bool,
    pub primary_key: Option<String>,
}

/// Display status of one provider's credential
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    Active,
    Inactive,
}

impl KeyStatus {
    pub fn message(self) -> &'static str {
        match self {
            KeyStatus::Active => "Active",
            KeyStatus::Inactive => "Not configured",
        }
    }
}

/// Credential store over an injectable storage area
#[derive(Clone)]
pub struct KeyStore {
    storage: Arc<dyn KeyValueStorage>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl KeyStore {
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self { storage }
    }

    /// Underlying storage area
    pub fn storage(&self) -> &Arc<dyn KeyValueStorage> {
        &self.storage
    }

    /// Credential for a provider, consulting the legacy slot as fallback
    pub fn get(&self, provider: Provider) -> Option<String> {
        let cfg = provider.config();
        non_blank(self.storage.get_item(cfg.storage_key)).or_else(|| {
            cfg.fallback_key
                .and_then(|slot| non_blank(self.storage.get_item(slot)))
        })
    }

    /// Store a credential (trimmed). Blank input removes it instead.
    ///
    /// Returns `false` when the storage area refused the write.
    pub fn set(&self, provider: Provider, secret: &str) -> bool {
        let secret = secret.trim();
        if secret.is_empty() {
            return self.remove(provider);
        }

        let cfg = provider.config();
        let result = self.storage.set_item(cfg.storage_key, secret).and_then(|_| {
            match cfg.fallback_key {
                Some(slot) => self.storage.set_item(slot, secret),
                None => Ok(()),
            }
        });

        match result {
            Ok(()) => {
                debug!(provider = provider.key(), key_len = secret.len(), "Stored API key");
                true
            }
            Err(e) => {
                warn!(provider = provider.key(), "Failed to store API key: {}", e);
                false
            }
        }
    }

    /// Remove a provider's credential from every slot it occupies
    pub fn remove(&self, provider: Provider) -> bool {
        let cfg = provider.config();
        let result = self.storage.remove_item(cfg.storage_key).and_then(|_| {
            match cfg.fallback_key {
                Some(slot) => self.storage.remove_item(slot),
                None => Ok(()),
            }
        });

        match result {
            Ok(()) => {
                debug!(provider = provider.key(), "Removed API key");
                true
            }
            Err(e) => {
                warn!(provider = provider.key(), "Failed to remove API key: {}", e);
                false
            }
        }
    }

    /// All configured credentials, in provider priority order
    pub fn list_active(&self) -> Vec<ActiveCredential> {
        Provider::ALL
            .into_iter()
            .filter_map(|provider| {
                let cfg = provider.config();
                self.get(provider).map(|key| ActiveCredential {
                    provider,
                    key,
                    name: cfg.name,
                    description: cfg.description,
                    storage_key: cfg.storage_key,
                })
            })
            .collect()
    }

    pub fn count(&self) -> usize {
        self.list_active().len()
    }

    pub fn has_valid_key(&self) -> bool {
        self.count() > 0
    }

    /// Primary provider's key if configured, else the first available one
    pub fn primary_key(&self) -> Option<String> {
        self.get(Provider::PRIMARY)
            .or_else(|| self.list_active().into_iter().next().map(|c| c.key))
    }

    pub fn status(&self, provider: Provider) -> KeyStatus {
        if self.get(provider).is_some() {
            KeyStatus::Active
        } else {
            KeyStatus::Inactive
        }
    }

    /// Compute the aggregate key state
    pub fn snapshot(&self) -> KeyState {
        let api_keys = self.list_active();
        let count = api_keys.len();
        let primary_key = self.primary_key();
        KeyState {
            api_keys,
            count,
            has_valid_key: count > 0,
            navigation_enabled: count > 0,
            primary_key,
        }
    }

    /// Remove whitespace-only residue left in any provider slot
    ///
    /// Returns the number of slots cleared.
    pub fn cleanup(&self) -> usize {
        let mut cleared = 0;
        for provider in Provider::ALL {
            let cfg = provider.config();
            let slots = std::iter::once(cfg.storage_key).chain(cfg.fallback_key);
            for slot in slots {
                let is_residue = self
                    .storage
                    .get_item(slot)
                    .map(|v| v.trim().is_empty())
                    .unwrap_or(false);
                if !is_residue {
                    continue;
                }
                match self.storage.remove_item(slot) {
                    Ok(()) => cleared += 1,
                    Err(e) => warn!(slot = slot, "Failed to clear empty API key slot: {}", e),
                }
            }
        }
        if cleared > 0 {
            info!("Cleared {} empty API key slot(s)", cleared);
        }
        cleared
    }

    /// Subscribe to raw storage changes of the underlying area
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<StorageChange> {
        self.storage.subscribe()
    }
}
