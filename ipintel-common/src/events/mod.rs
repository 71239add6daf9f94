//! Event types for the client event system
//!
//! Provides the process-local publish/subscribe used for credential-update
//! broadcasts, navigation requests and transient notifications.

mod shared_types;

pub use shared_types::{KeyUpdateStatus, Severity};

use crate::keys::Provider;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Client event types
///
/// Events are broadcast via EventBus. None of them are persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IntelEvent {
    /// A provider credential was validated, removed or rejected
    ///
    /// Triggers:
    /// - Key-state synchronizer: recompute aggregate key state
    /// - Navigator: unlock or lock the dashboard
    ApiKeyUpdated {
        /// Provider whose credential changed
        provider: Provider,
        /// What happened to it
        status: KeyUpdateStatus,
        /// Number of configured providers after the change
        api_key_count: usize,
        /// Whether at least one credential remains configured
        has_valid_key: bool,
        /// When the change happened
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Request to move to the dashboard page
    ///
    /// Honoured only while navigation is enabled.
    NavigateToDashboard {
        /// When the request was issued
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Transient user-facing notification (toast / inline alert)
    Notification {
        severity: Severity,
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl IntelEvent {
    /// Get event type as string for filtering
    pub fn event_type(&self) -> &str {
        match self {
            IntelEvent::ApiKeyUpdated { .. } => "ApiKeyUpdated",
            IntelEvent::NavigateToDashboard { .. } => "NavigateToDashboard",
            IntelEvent::Notification { .. } => "Notification",
        }
    }

    /// Build a notification event stamped with the current time
    pub fn notification(severity: Severity, message: impl Into<String>) -> Self {
        IntelEvent::Notification {
            severity,
            message: message.into(),
            timestamp: chrono::Utc::now(),
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use ipintel_common::events::{EventBus, IntelEvent, Severity};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(IntelEvent::notification(Severity::Info, "hello"));
///
/// let received = rx.try_recv().unwrap();
/// assert_eq!(received.event_type(), "Notification");
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<IntelEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// * `capacity` - Number of events to buffer before dropping old events
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<IntelEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: IntelEvent,
    ) -> Result<usize, broadcast::error::SendError<IntelEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: IntelEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("Event dropped: no subscribers");
        }
    }

    /// Emit a notification, ignoring if no subscribers are listening
    pub fn notify(&self, severity: Severity, message: impl Into<String>) {
        self.emit_lossy(IntelEvent::notification(severity, message));
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eventbus_new() {
        let bus = EventBus::new(100);
        assert_eq!(bus.capacity(), 100);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_eventbus_emit_without_subscribers_fails() {
        let bus = EventBus::new(10);
        let result = bus.emit(IntelEvent::NavigateToDashboard {
            timestamp: chrono::Utc::now(),
        });
        assert!(result.is_err());

        // Lossy variant must not panic
        bus.notify(Severity::Info, "nobody listening");
    }

    #[test]
    fn test_eventbus_multiple_subscribers() {
        let bus = EventBus::new(10);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.emit(IntelEvent::ApiKeyUpdated {
            provider: Provider::Shodan,
            status: KeyUpdateStatus::Validated,
            api_key_count: 1,
            has_valid_key: true,
            timestamp: chrono::Utc::now(),
        })
        .expect("emit should succeed");

        assert_eq!(rx1.try_recv().expect("rx1 should receive").event_type(), "ApiKeyUpdated");
        assert_eq!(rx2.try_recv().expect("rx2 should receive").event_type(), "ApiKeyUpdated");
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = IntelEvent::ApiKeyUpdated {
            provider: Provider::VirusTotal,
            status: KeyUpdateStatus::Removed,
            api_key_count: 0,
            has_valid_key: false,
            timestamp: chrono::Utc::now(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "ApiKeyUpdated");
        assert_eq!(json["provider"], "virustotal");
        assert_eq!(json["status"], "removed");

        let back: IntelEvent = serde_json::from_value(json).unwrap();
        match back {
            IntelEvent::ApiKeyUpdated { provider, status, .. } => {
                assert_eq!(provider, Provider::VirusTotal);
                assert_eq!(status, KeyUpdateStatus::Removed);
            }
            _ => panic!("Wrong event type deserialized"),
        }
    }
}
