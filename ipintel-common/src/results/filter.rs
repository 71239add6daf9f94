//! Per-column substring filters

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::api::EnrichmentRecord;
use crate::Error;

/// Filterable table columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    IpAddress,
    Hostname,
    Country,
    Organization,
    Asn,
    Ports,
    Status,
}

impl Column {
    pub const ALL: [Column; 7] = [
        Column::IpAddress,
        Column::Hostname,
        Column::Country,
        Column::Organization,
        Column::Asn,
        Column::Ports,
        Column::Status,
    ];

    pub fn title(self) -> &'static str {
        match self {
            Column::IpAddress => "IP Address",
            Column::Hostname => "Hostname",
            Column::Country => "Country",
            Column::Organization => "Organization",
            Column::Asn => "ASN",
            Column::Ports => "Open Ports",
            Column::Status => "Status",
        }
    }

    /// Whether `record`'s value in this column contains `needle` (already lowercased)
    fn matches(self, record: &EnrichmentRecord, needle: &str) -> bool {
        let contains = |value: Option<&str>| {
            value
                .map(|v| v.to_lowercase().contains(needle))
                .unwrap_or(false)
        };
        match self {
            Column::IpAddress => contains(Some(&record.ip_address)),
            Column::Hostname => contains(record.hostname.as_deref()),
            Column::Country => contains(record.country.as_deref()),
            Column::Organization => contains(record.org.as_deref()),
            Column::Asn => contains(record.asn.as_deref()),
            Column::Ports => record
                .ports
                .iter()
                .any(|port| port.to_string().contains(needle)),
            Column::Status => contains(Some(record.status_label())),
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

impl FromStr for Column {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "ip" | "ip_address" => Ok(Column::IpAddress),
            "hostname" | "host" => Ok(Column::Hostname),
            "country" => Ok(Column::Country),
            "org" | "organization" => Ok(Column::Organization),
            "asn" => Ok(Column::Asn),
            "ports" | "open_ports" => Ok(Column::Ports),
            "status" => Ok(Column::Status),
            _ => Err(Error::InvalidInput(format!("Unknown column: {}", s))),
        }
    }
}

/// Active filters; a record is visible when it matches every one
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnFilters {
    filters: BTreeMap<Column, String>,
}

impl ColumnFilters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a column filter; blank text clears it
    pub fn set(&mut self, column: Column, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            self.filters.remove(&column);
        } else {
            self.filters.insert(column, text.to_lowercase());
        }
    }

    pub fn clear(&mut self) {
        self.filters.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn get(&self, column: Column) -> Option<&str> {
        self.filters.get(&column).map(String::as_str)
    }

    pub fn matches(&self, record: &EnrichmentRecord) -> bool {
        self.filters
            .iter()
            .all(|(column, needle)| column.matches(record, needle))
    }

    pub fn apply<'a>(&self, records: &'a [EnrichmentRecord]) -> Vec<&'a EnrichmentRecord> {
        records.iter().filter(|r| self.matches(r)).collect()
    }
}
