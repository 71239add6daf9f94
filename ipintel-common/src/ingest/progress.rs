//! Per-address progress of a streamed submission

use serde::{Deserialize, Serialize};

use super::message::StreamMessage;

/// Status shown next to one submitted address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Processing,
    Enriched,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamingItem {
    pub ip_address: String,
    pub status: ItemStatus,
    /// Failure reason for `ItemStatus::Error`
    pub message: Option<String>,
}

/// What the pipeline must do after a message was applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEffect {
    None,
    /// An address was stored remotely; the canonical list is stale
    Refetch,
    /// The batch failed as a whole; stop consuming
    Abort(String),
}

/// Streaming items in first-arrival order, one per address
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamingProgress {
    items: Vec<StreamingItem>,
}

impl StreamingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[StreamingItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn count(&self, status: ItemStatus) -> usize {
        self.items.iter().filter(|i| i.status == status).count()
    }

    pub fn get(&self, ip_address: &str) -> Option<&StreamingItem> {
        self.items.iter().find(|i| i.ip_address == ip_address)
    }

    fn upsert(&mut self, ip_address: &str, status: ItemStatus, message: Option<String>) {
        match self.items.iter_mut().find(|i| i.ip_address == ip_address) {
            Some(item) => {
                item.status = status;
                item.message = message;
            }
            None => self.items.push(StreamingItem {
                ip_address: ip_address.to_string(),
                status,
                message,
            }),
        }
    }

    /// Fold one stream message into the item list
    pub fn apply(&mut self, message: &StreamMessage) -> ProgressEffect {
        match message {
            StreamMessage::Failure { error } => ProgressEffect::Abort(error.clone()),
            StreamMessage::Processing { ip_address } => {
                self.upsert(ip_address, ItemStatus::Processing, None);
                ProgressEffect::None
            }
            StreamMessage::Enriched { ip_address, .. } => {
                self.upsert(ip_address, ItemStatus::Enriched, None);
                ProgressEffect::Refetch
            }
            StreamMessage::ItemError { ip_address, message } => {
                self.upsert(ip_address, ItemStatus::Error, Some(message.clone()));
                ProgressEffect::None
            }
            StreamMessage::Unrecognized { .. } => ProgressEffect::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn processing(ip: &str) -> StreamMessage {
        StreamMessage::Processing {
            ip_address: ip.to_string(),
        }
    }

    fn enriched(ip: &str) -> StreamMessage {
        StreamMessage::Enriched {
            ip_address: ip.to_string(),
            fields: Map::new(),
        }
    }

    #[test]
    fn test_upsert_keeps_first_arrival_order() {
        let mut progress = StreamingProgress::new();
        progress.apply(&processing("8.8.8.8"));
        progress.apply(&processing("1.1.1.1"));
        assert_eq!(progress.apply(&enriched("8.8.8.8")), ProgressEffect::Refetch);

        let ips: Vec<&str> = progress.items().iter().map(|i| i.ip_address.as_str()).collect();
        assert_eq!(ips, vec!["8.8.8.8", "1.1.1.1"]);
        assert_eq!(progress.get("8.8.8.8").unwrap().status, ItemStatus::Enriched);
        assert_eq!(progress.count(ItemStatus::Processing), 1);
    }

    #[test]
    fn test_item_error_carries_message_and_continues() {
        let mut progress = StreamingProgress::new();
        let effect = progress.apply(&StreamMessage::ItemError {
            ip_address: "10.0.0.1".to_string(),
            message: "Private address".to_string(),
        });
        assert_eq!(effect, ProgressEffect::None);
        let item = progress.get("10.0.0.1").unwrap();
        assert_eq!(item.status, ItemStatus::Error);
        assert_eq!(item.message.as_deref(), Some("Private address"));
    }

    #[test]
    fn test_failure_aborts_without_touching_items() {
        let mut progress = StreamingProgress::new();
        progress.apply(&processing("8.8.8.8"));
        let effect = progress.apply(&StreamMessage::Failure {
            error: "Invalid API key".to_string(),
        });
        assert_eq!(effect, ProgressEffect::Abort("Invalid API key".to_string()));
        assert_eq!(progress.items().len(), 1);
    }

    #[test]
    fn test_unrecognized_status_is_ignored() {
        let mut progress = StreamingProgress::new();
        let effect = progress.apply(&StreamMessage::Unrecognized {
            status: "queued".to_string(),
        });
        assert_eq!(effect, ProgressEffect::None);
        assert!(progress.is_empty());
    }
}
