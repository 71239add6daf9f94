//! Request/response types of the remote enrichment service

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Header carrying the provider credential
pub const API_KEY_HEADER: &str = "X-API-Key";

/// One enriched IP address as stored by the remote service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentRecord {
    pub id: i64,
    pub ip_address: String,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub org: Option<String>,
    #[serde(default)]
    pub os: Option<String>,
    #[serde(default)]
    pub isp: Option<String>,
    #[serde(default)]
    pub asn: Option<String>,
    #[serde(default)]
    pub last_shodan_update: Option<String>,
    /// Vulnerability identifiers, shape decided by the provider
    #[serde(default)]
    pub vulns: Value,
    /// Server-side modification time (ISO 8601, no zone)
    #[serde(default)]
    pub last_updated: Option<String>,
    #[serde(default)]
    pub ports: Vec<u16>,
    /// Status label shown in the table
    #[serde(default)]
    pub status: Option<String>,
}

impl EnrichmentRecord {
    /// Minimal record, used by fakes and tests
    pub fn new(id: i64, ip_address: impl Into<String>) -> Self {
        Self {
            id,
            ip_address: ip_address.into(),
            hostname: None,
            country: None,
            city: None,
            org: None,
            os: None,
            isp: None,
            asn: None,
            last_shodan_update: None,
            vulns: Value::Null,
            last_updated: None,
            ports: Vec::new(),
            status: None,
        }
    }

    /// Status label, defaulting to "enriched" for stored records
    pub fn status_label(&self) -> &str {
        self.status.as_deref().unwrap_or("enriched")
    }

    /// Ports rendered as "80, 443"
    pub fn ports_display(&self) -> String {
        self.ports
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Body of `POST /ips` and `POST /ips/stream`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpsRequest {
    pub ips: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateKeyRequest {
    pub api_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateKeyResponse {
    pub is_valid: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkDeleteRequest {
    pub ids: Vec<i64>,
}

/// Error body returned by the remote service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Record echoed back by `POST /ips`
///
/// The service serializes these before committing, so `id` is often null.
/// Only the list endpoint is authoritative for ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmittedRecord {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, Value>,
}

impl From<&EnrichmentRecord> for SubmittedRecord {
    fn from(record: &EnrichmentRecord) -> Self {
        Self {
            id: Some(record.id),
            ip_address: Some(record.ip_address.clone()),
            fields: serde_json::Map::new(),
        }
    }
}

/// Outcome of a legacy (non-streaming) submission
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubmitReport {
    #[serde(default)]
    pub enriched_ips: Vec<SubmittedRecord>,
    #[serde(default)]
    pub errors: Vec<String>,
}

/// `POST /ips` answers with a bare array when every address succeeded
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum SubmitBody {
    Records(Vec<SubmittedRecord>),
    Report(SubmitReport),
}

impl From<SubmitBody> for SubmitReport {
    fn from(body: SubmitBody) -> Self {
        match body {
            SubmitBody::Records(enriched_ips) => SubmitReport {
                enriched_ips,
                errors: Vec::new(),
            },
            SubmitBody::Report(report) => report,
        }
    }
}

/// Credit counter that the provider may report as a number or a placeholder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CreditValue {
    Count(i64),
    Text(String),
}

impl fmt::Display for CreditValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CreditValue::Count(n) => write!(f, "{}", n),
            CreditValue::Text(s) => f.write_str(s),
        }
    }
}

/// Plan information for the primary provider account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiInfo {
    pub plan: String,
    pub query_credits: CreditValue,
    pub scan_credits: CreditValue,
}
