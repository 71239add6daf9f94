//! Key-state synchronizer
//!
//! Keeps one reactive view of the aggregate key state. It refreshes when a
//! credential slot changes in the shared storage area (this handle or any
//! other handle on the same area) and when an `ApiKeyUpdated` event is
//! broadcast. Dependents hold a `watch::Receiver<KeyState>`.

use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use super::provider::is_credential_slot;
use super::storage::StorageChange;
use super::store::{KeyState, KeyStore};
use crate::events::{EventBus, IntelEvent, KeyUpdateStatus};
use crate::keys::Provider;

pub struct KeyStateSynchronizer {
    store: KeyStore,
    bus: EventBus,
    state_tx: watch::Sender<KeyState>,
    storage_rx: broadcast::Receiver<StorageChange>,
    event_rx: broadcast::Receiver<IntelEvent>,
}

impl KeyStateSynchronizer {
    /// Clean up residue left by earlier sessions and compute the initial state
    pub fn new(store: KeyStore, bus: EventBus) -> Self {
        let storage_rx = store.subscribe();
        let event_rx = bus.subscribe();

        store.cleanup();
        let initial = store.snapshot();
        info!(
            api_key_count = initial.count,
            has_valid_key = initial.has_valid_key,
            "Key state initialized"
        );
        let (state_tx, _) = watch::channel(initial);

        Self {
            store,
            bus,
            state_tx,
            storage_rx,
            event_rx,
        }
    }

    /// Reactive view of the aggregate key state
    pub fn subscribe(&self) -> watch::Receiver<KeyState> {
        self.state_tx.subscribe()
    }

    pub fn current(&self) -> KeyState {
        self.state_tx.borrow().clone()
    }

    pub fn store(&self) -> &KeyStore {
        &self.store
    }

    /// Recompute from the store and publish
    pub fn refresh(&self) -> KeyState {
        let state = self.store.snapshot();
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state.clone();
                true
            }
        });
        state
    }

    /// Broadcast a credential update carrying the post-change counts
    pub fn announce(&self, provider: Provider, status: KeyUpdateStatus) {
        broadcast_key_update(&self.store, &self.bus, provider, status);
    }

    fn on_storage_change(&self, change: &StorageChange) -> bool {
        if !is_credential_slot(&change.key) {
            return false;
        }
        let provider = Provider::for_slot(&change.key).map(Provider::key);
        debug!(slot = %change.key, provider, "Storage change detected");
        self.refresh();
        true
    }

    fn on_event(&self, event: &IntelEvent) -> bool {
        match event {
            IntelEvent::ApiKeyUpdated { provider, status, .. } => {
                debug!(provider = provider.key(), status = ?status, "API key update event");
                let state = self.refresh();
                if *status == KeyUpdateStatus::Validated && state.has_valid_key {
                    debug!("API key validated, navigation enabled");
                }
                true
            }
            _ => false,
        }
    }

    /// Apply every notification already queued and return the resulting state
    ///
    /// One call corresponds to one UI update cycle.
    pub fn process_pending(&mut self) -> KeyState {
        loop {
            match self.storage_rx.try_recv() {
                Ok(change) => {
                    self.on_storage_change(&change);
                }
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Storage notifications lagged, forcing refresh");
                    self.refresh();
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        loop {
            match self.event_rx.try_recv() {
                Ok(event) => {
                    self.on_event(&event);
                }
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event notifications lagged, forcing refresh");
                    self.refresh();
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        self.current()
    }

    /// Run until both notification sources close
    pub async fn run(mut self) {
        let mut storage_open = true;
        let mut events_open = true;

        while storage_open || events_open {
            tokio::select! {
                change = self.storage_rx.recv(), if storage_open => match change {
                    Ok(change) => {
                        self.on_storage_change(&change);
                    }
                    Err(RecvError::Lagged(_)) => {
                        self.refresh();
                    }
                    Err(RecvError::Closed) => storage_open = false,
                },
                event = self.event_rx.recv(), if events_open => match event {
                    Ok(event) => {
                        self.on_event(&event);
                    }
                    Err(RecvError::Lagged(_)) => {
                        self.refresh();
                    }
                    Err(RecvError::Closed) => events_open = false,
                },
            }
        }
        debug!("Key state synchronizer stopped");
    }
}

/// Emit `ApiKeyUpdated` with counts taken from the store after the change
pub fn broadcast_key_update(store: &KeyStore, bus: &EventBus, provider: Provider, status: KeyUpdateStatus) {
    let api_key_count = store.count();
    bus.emit_lossy(IntelEvent::ApiKeyUpdated {
        provider,
        status,
        api_key_count,
        has_valid_key: api_key_count > 0,
        timestamp: chrono::Utc::now(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::storage::{KeyValueStorage, MemoryStorage};
    use std::sync::Arc;

    fn setup() -> (Arc<MemoryStorage>, KeyStateSynchronizer) {
        let storage = Arc::new(MemoryStorage::new());
        let store = KeyStore::new(storage.clone());
        let sync = KeyStateSynchronizer::new(store, EventBus::new(32));
        (storage, sync)
    }

    #[test]
    fn test_initialization_cleans_residue() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set_item("apiKey", "  ").unwrap();
        storage.set_item("virusTotalApiKey", "vt").unwrap();

        let sync = KeyStateSynchronizer::new(KeyStore::new(storage.clone()), EventBus::new(8));

        assert!(storage.get_item("apiKey").is_none());
        assert_eq!(sync.current().count, 1);
    }

    #[test]
    fn test_change_in_same_handle_refreshes_view() {
        let (_storage, mut sync) = setup();
        let rx = sync.subscribe();
        assert!(!rx.borrow().has_valid_key);

        sync.store().set(Provider::Shodan, "abc");
        sync.process_pending();

        let state = rx.borrow().clone();
        assert!(state.has_valid_key);
        assert_eq!(state.primary_key.as_deref(), Some("abc"));
    }

    #[test]
    fn test_change_from_other_handle_refreshes_view() {
        let (storage, mut sync) = setup();
        let rx = sync.subscribe();

        // A second handle on the same area, like another browser tab
        let other_tab = KeyStore::new(storage.clone());
        other_tab.set(Provider::AbuseIpDb, "abuse");

        sync.process_pending();
        assert_eq!(rx.borrow().count, 1);

        other_tab.remove(Provider::AbuseIpDb);
        sync.process_pending();
        assert_eq!(rx.borrow().count, 0);
    }

    #[test]
    fn test_unrelated_slot_does_not_publish() {
        let (storage, mut sync) = setup();
        let rx = sync.subscribe();

        storage.set_item("themeMode", "dark").unwrap();
        sync.process_pending();

        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_broadcast_event_refreshes_view() {
        let storage = Arc::new(MemoryStorage::new());
        let bus = EventBus::new(8);
        let mut sync = KeyStateSynchronizer::new(KeyStore::new(storage.clone()), bus.clone());

        // Write behind the synchronizer's back, then drop the storage notification
        storage.set_item("virusTotalApiKey", "vt").unwrap();
        let _ = sync.storage_rx.try_recv();
        assert_eq!(sync.current().count, 0);

        sync.announce(Provider::VirusTotal, KeyUpdateStatus::Validated);
        let state = sync.process_pending();
        assert_eq!(state.count, 1);
    }

    #[tokio::test]
    async fn test_run_loop_publishes_changes() {
        let (storage, sync) = setup();
        let mut rx = sync.subscribe();
        let other_tab = KeyStore::new(storage.clone());

        let handle = tokio::spawn(sync.run());

        other_tab.set(Provider::Shodan, "live");
        rx.changed().await.unwrap();
        assert!(rx.borrow().has_valid_key);

        handle.abort();
    }
}
