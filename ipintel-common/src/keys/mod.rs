//! Provider credentials: storage, aggregate state and navigation gating

pub mod navigation;
pub mod provider;
pub mod storage;
pub mod store;
pub mod sync;

pub use navigation::{Navigator, Page};
pub use provider::{is_credential_slot, Provider, ProviderConfig};
pub use storage::{FileStorage, KeyValueStorage, MemoryStorage, StorageChange};
pub use store::{ActiveCredential, KeyState, KeyStatus, KeyStore};
pub use sync::{broadcast_key_update, KeyStateSynchronizer};
