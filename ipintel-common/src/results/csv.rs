//! CSV export of enrichment records

use crate::api::EnrichmentRecord;

pub const CSV_HEADER: [&str; 8] = [
    "ID",
    "IP Address",
    "Hostname",
    "Country",
    "Organization",
    "ASN",
    "Open Ports",
    "Status",
];

/// Quote a field when it contains a delimiter, quote or line break
pub fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn row(fields: &[&str]) -> String {
    fields
        .iter()
        .map(|f| escape_field(f))
        .collect::<Vec<_>>()
        .join(",")
}

/// Render header plus one line per record, each line terminated by `\n`
pub fn to_csv(records: &[EnrichmentRecord]) -> String {
    let mut out = row(&CSV_HEADER);
    out.push('\n');
    for record in records {
        let id = record.id.to_string();
        let ports = record.ports_display();
        out.push_str(&row(&[
            id.as_str(),
            record.ip_address.as_str(),
            record.hostname.as_deref().unwrap_or(""),
            record.country.as_deref().unwrap_or(""),
            record.org.as_deref().unwrap_or(""),
            record.asn.as_deref().unwrap_or(""),
            ports.as_str(),
            record.status_label(),
        ]));
        out.push('\n');
    }
    out
}
