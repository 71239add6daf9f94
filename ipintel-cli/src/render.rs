//! Terminal rendering

use std::collections::HashMap;

use ipintel_common::api::{ApiInfo, EnrichmentRecord};
use ipintel_common::events::{IntelEvent, Severity};
use ipintel_common::ingest::{IngestReport, ItemStatus, StreamingProgress};
use ipintel_common::keys::{KeyState, KeyStore, Provider};
use ipintel_common::results::CSV_HEADER;
use tokio::sync::{broadcast, watch};

/// Show only the first and last four characters of a secret
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}…{}", head, tail)
}

pub fn key_status(store: &KeyStore, state: &KeyState) -> String {
    let mut out = String::new();
    for provider in Provider::ALL {
        let status = store.status(provider);
        let masked = store
            .get(provider)
            .map(|k| mask_secret(&k))
            .unwrap_or_default();
        out.push_str(&format!(
            "{:<12} {:<16} {}\n",
            provider.name(),
            status.message(),
            masked
        ));
    }
    out.push_str(&format!(
        "{} of {} providers configured{}\n",
        state.count,
        Provider::ALL.len(),
        if state.navigation_enabled {
            ""
        } else {
            " (dashboard locked)"
        }
    ));
    out
}

fn severity_label(severity: Severity) -> &'static str {
    match severity {
        Severity::Info => "info",
        Severity::Success => "ok",
        Severity::Warning => "warning",
        Severity::Error => "error",
    }
}

/// Print queued notifications to stderr; returns how many were errors
pub fn flush_notifications(rx: &mut broadcast::Receiver<IntelEvent>) -> usize {
    let mut errors = 0;
    while let Ok(event) = rx.try_recv() {
        if let IntelEvent::Notification { severity, message, .. } = event {
            if severity == Severity::Error {
                errors += 1;
            }
            eprintln!("[{}] {}", severity_label(severity), message);
        }
    }
    errors
}

fn row(record: &EnrichmentRecord) -> [String; 8] {
    [
        record.id.to_string(),
        record.ip_address.clone(),
        record.hostname.clone().unwrap_or_default(),
        record.country.clone().unwrap_or_default(),
        record.org.clone().unwrap_or_default(),
        record.asn.clone().unwrap_or_default(),
        record.ports_display(),
        record.status_label().to_string(),
    ]
}

/// Column-aligned table with the export header
pub fn records_table(records: &[EnrichmentRecord]) -> String {
    let rows: Vec<[String; 8]> = records.iter().map(row).collect();
    let mut widths: Vec<usize> = CSV_HEADER.iter().map(|h| h.chars().count()).collect();
    for r in &rows {
        for (width, cell) in widths.iter_mut().zip(r.iter()) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let line = |cells: Vec<&str>| -> String {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut out = line(CSV_HEADER.to_vec());
    out.push('\n');
    for r in &rows {
        out.push_str(&line(r.iter().map(String::as_str).collect()));
        out.push('\n');
    }
    out
}

fn status_label(status: ItemStatus) -> &'static str {
    match status {
        ItemStatus::Processing => "processing",
        ItemStatus::Enriched => "enriched",
        ItemStatus::Error => "error",
    }
}

/// Emits one line per streaming item whenever its status changes
#[derive(Default)]
pub struct ProgressPrinter {
    seen: HashMap<String, ItemStatus>,
}

impl ProgressPrinter {
    pub fn changes(&mut self, progress: &StreamingProgress) -> Vec<String> {
        let mut lines = Vec::new();
        for item in progress.items() {
            if self.seen.get(&item.ip_address) == Some(&item.status) {
                continue;
            }
            self.seen.insert(item.ip_address.clone(), item.status);
            let mut line = format!("{:<40} {}", item.ip_address, status_label(item.status));
            if let Some(message) = &item.message {
                line.push_str(&format!(" ({})", message));
            }
            lines.push(line);
        }
        lines
    }
}

/// Follow a submission's progress until the pipeline is dropped
pub async fn follow_progress(mut rx: watch::Receiver<StreamingProgress>) {
    let mut printer = ProgressPrinter::default();
    while rx.changed().await.is_ok() {
        let progress = rx.borrow_and_update().clone();
        for line in printer.changes(&progress) {
            println!("{}", line);
        }
    }
}

pub fn report_summary(report: &IngestReport) -> String {
    let mut summary = format!(
        "{} enriched, {} failed, {} pending",
        report.enriched, report.failed, report.processing
    );
    if report.aborted {
        summary.push_str(" (stopped early)");
    }
    summary
}

pub fn api_info(info: &ApiInfo) -> String {
    format!(
        "Plan:          {}\nQuery credits: {}\nScan credits:  {}\n",
        info.plan, info.query_credits, info.scan_credits
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipintel_common::ingest::StreamMessage;
    use serde_json::Map;

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret("abc"), "***");
        assert_eq!(mask_secret("abcdefghijkl"), "abcd…ijkl");
    }

    #[test]
    fn test_records_table_alignment() {
        let mut record = EnrichmentRecord::new(12, "8.8.8.8");
        record.ports = vec![53, 443];
        let table = records_table(&[record]);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("ID  IP Address"));
        assert!(lines[1].starts_with("12  8.8.8.8"));
        assert!(lines[1].contains("53, 443"));
        assert!(lines[1].ends_with("enriched"));
    }

    #[test]
    fn test_progress_printer_reports_each_transition_once() {
        let mut progress = StreamingProgress::new();
        let mut printer = ProgressPrinter::default();

        progress.apply(&StreamMessage::Processing {
            ip_address: "8.8.8.8".to_string(),
        });
        assert_eq!(printer.changes(&progress).len(), 1);
        assert!(printer.changes(&progress).is_empty());

        progress.apply(&StreamMessage::Enriched {
            ip_address: "8.8.8.8".to_string(),
            fields: Map::new(),
        });
        let lines = printer.changes(&progress);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with("enriched"));
    }
}
