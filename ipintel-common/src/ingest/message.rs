//! Messages pushed by the streaming ingestion endpoint

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::{Error, Result};

/// Per-item status values on the wire
pub const STATUS_PROCESSING: &str = "processing";
pub const STATUS_ENRICHED: &str = "enriched";
pub const STATUS_ERROR: &str = "error";

/// One decoded stream message
#[derive(Debug, Clone, PartialEq)]
pub enum StreamMessage {
    /// Batch-level failure; ends the submission
    Failure { error: String },
    /// Address accepted, lookup in progress
    Processing { ip_address: String },
    /// Address enriched and stored; `fields` holds whatever else was sent
    Enriched {
        ip_address: String,
        fields: Map<String, Value>,
    },
    /// Lookup failed for this address only
    ItemError { ip_address: String, message: String },
    /// Status this client does not know; ignored
    Unrecognized { status: String },
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(default, alias = "ip")]
    ip_address: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

impl StreamMessage {
    /// Parse one event payload
    ///
    /// A `status` field classifies the message as per-item; an `error` field
    /// without a status is a batch failure.
    pub fn parse(data: &str) -> Result<Self> {
        let raw: RawMessage = serde_json::from_str(data)
            .map_err(|e| Error::Decode(format!("Invalid stream message: {}", e)))?;

        let status = match raw.status {
            Some(status) => status,
            None => {
                return match raw.error {
                    Some(error) => Ok(StreamMessage::Failure { error }),
                    None => Err(Error::Decode(
                        "Stream message has neither status nor error".to_string(),
                    )),
                };
            }
        };

        let require_ip = |ip: Option<String>| {
            ip.ok_or_else(|| {
                Error::Decode(format!("Stream message with status '{}' lacks an IP address", status))
            })
        };

        match status.as_str() {
            STATUS_PROCESSING => Ok(StreamMessage::Processing {
                ip_address: require_ip(raw.ip_address)?,
            }),
            STATUS_ENRICHED => Ok(StreamMessage::Enriched {
                ip_address: require_ip(raw.ip_address)?,
                fields: raw.fields,
            }),
            STATUS_ERROR => Ok(StreamMessage::ItemError {
                ip_address: require_ip(raw.ip_address)?,
                message: raw
                    .message
                    .or(raw.error)
                    .unwrap_or_else(|| "Enrichment failed".to_string()),
            }),
            _ => Ok(StreamMessage::Unrecognized { status }),
        }
    }

    /// Address this message refers to, if it is per-item
    pub fn ip_address(&self) -> Option<&str> {
        match self {
            StreamMessage::Processing { ip_address }
            | StreamMessage::Enriched { ip_address, .. }
            | StreamMessage::ItemError { ip_address, .. } => Some(ip_address),
            StreamMessage::Failure { .. } | StreamMessage::Unrecognized { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_processing_with_short_ip_key() {
        let msg = StreamMessage::parse(r#"{"ip":"8.8.8.8","status":"processing"}"#).unwrap();
        assert_eq!(
            msg,
            StreamMessage::Processing {
                ip_address: "8.8.8.8".to_string()
            }
        );
    }

    #[test]
    fn test_parse_enriched_keeps_extra_fields() {
        let msg = StreamMessage::parse(
            r#"{"ip_address":"8.8.8.8","status":"enriched","country":"United States","ports":[53]}"#,
        )
        .unwrap();
        match msg {
            StreamMessage::Enriched { ip_address, fields } => {
                assert_eq!(ip_address, "8.8.8.8");
                assert_eq!(fields["country"], "United States");
                assert!(!fields.contains_key("status"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_item_error() {
        let msg = StreamMessage::parse(r#"{"ip":"10.0.0.1","status":"error","message":"Not found"}"#).unwrap();
        assert_eq!(
            msg,
            StreamMessage::ItemError {
                ip_address: "10.0.0.1".to_string(),
                message: "Not found".to_string()
            }
        );
    }

    #[test]
    fn test_error_without_status_is_batch_failure() {
        let msg = StreamMessage::parse(r#"{"error":"Invalid or missing API key"}"#).unwrap();
        assert_eq!(
            msg,
            StreamMessage::Failure {
                error: "Invalid or missing API key".to_string()
            }
        );
        assert!(msg.ip_address().is_none());
    }

    #[test]
    fn test_malformed_messages() {
        assert!(StreamMessage::parse("not json").is_err());
        assert!(StreamMessage::parse(r#"{"ip":"1.1.1.1"}"#).is_err());
        assert!(StreamMessage::parse(r#"{"status":"enriched"}"#).is_err());
        assert_eq!(
            StreamMessage::parse(r#"{"ip":"1.1.1.1","status":"queued"}"#).unwrap(),
            StreamMessage::Unrecognized {
                status: "queued".to_string()
            }
        );
    }
}
