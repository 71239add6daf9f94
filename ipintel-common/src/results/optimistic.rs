//! Apply locally, confirm remotely, revert on failure

use std::future::Future;

use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Remove matching items from `items` immediately, then await `confirm`
///
/// On confirmation failure the list is restored to its exact prior contents
/// and the error is returned. On success the removed items are returned.
/// The lock is not held while `confirm` runs.
pub async fn optimistic_remove<T, P, F, E>(
    items: &Mutex<Vec<T>>,
    should_remove: P,
    confirm: F,
) -> Result<Vec<T>, E>
where
    T: Clone,
    P: Fn(&T) -> bool,
    F: Future<Output = Result<(), E>>,
    E: std::fmt::Display,
{
    let (snapshot, removed) = {
        let mut guard = items.lock().await;
        let snapshot = guard.clone();
        let (removed, kept): (Vec<T>, Vec<T>) = guard.drain(..).partition(|item| should_remove(item));
        *guard = kept;
        (snapshot, removed)
    };
    debug!(removed = removed.len(), "Applied optimistic removal");

    match confirm.await {
        Ok(()) => Ok(removed),
        Err(e) => {
            warn!("Remote confirmation failed, reverting optimistic removal: {}", e);
            *items.lock().await = snapshot;
            Err(e)
        }
    }
}
