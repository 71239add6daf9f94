//! Streaming ingestion pipeline
//!
//! One submission opens one `POST /ips/stream` request and consumes its
//! messages in arrival order. Every enriched address triggers a full
//! canonical refetch, awaited before the next message is read, so the table
//! never trails the stream by more than one message.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::input::IpInput;
use super::progress::{ItemStatus, ProgressEffect, StreamingProgress};
use crate::api::EnrichmentApi;
use crate::events::{EventBus, Severity};
use crate::keys::KeyStore;
use crate::results::ResultTable;
use crate::{Error, Result};

/// Fallback when the server gives no reason
pub const UNKNOWN_ERROR_MESSAGE: &str = "An unknown error occurred.";

/// When a streamed submission counts as finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamCompletion {
    /// Consume until the server closes the connection
    #[default]
    ServerClose,
    /// Stop consuming after this long without a message
    IdleTimeout(Duration),
}

/// Summary of one submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub submission_id: Uuid,
    pub enriched: usize,
    pub failed: usize,
    /// Items still pending when consumption stopped
    pub processing: usize,
    /// Batch failure or transport error ended the submission
    pub aborted: bool,
    /// Per-address errors reported by a legacy submission
    pub errors: Vec<String>,
}

impl IngestReport {
    fn from_progress(submission_id: Uuid, progress: &StreamingProgress, aborted: bool) -> Self {
        Self {
            submission_id,
            enriched: progress.count(ItemStatus::Enriched),
            failed: progress.count(ItemStatus::Error),
            processing: progress.count(ItemStatus::Processing),
            aborted,
            errors: Vec::new(),
        }
    }
}

pub struct IngestionPipeline {
    api: Arc<dyn EnrichmentApi>,
    table: Arc<ResultTable>,
    store: KeyStore,
    bus: EventBus,
    completion: StreamCompletion,
    busy_tx: watch::Sender<bool>,
    progress_tx: watch::Sender<StreamingProgress>,
}

impl IngestionPipeline {
    pub fn new(
        api: Arc<dyn EnrichmentApi>,
        table: Arc<ResultTable>,
        store: KeyStore,
        bus: EventBus,
        completion: StreamCompletion,
    ) -> Self {
        let (busy_tx, _) = watch::channel(false);
        let (progress_tx, _) = watch::channel(StreamingProgress::new());
        Self {
            api,
            table,
            store,
            bus,
            completion,
            busy_tx,
            progress_tx,
        }
    }

    pub fn table(&self) -> &Arc<ResultTable> {
        &self.table
    }

    /// True from submission until the stream opens (or fails to)
    pub fn is_busy(&self) -> bool {
        *self.busy_tx.borrow()
    }

    pub fn subscribe_busy(&self) -> watch::Receiver<bool> {
        self.busy_tx.subscribe()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<StreamingProgress> {
        self.progress_tx.subscribe()
    }

    pub fn progress(&self) -> StreamingProgress {
        self.progress_tx.borrow().clone()
    }

    fn resolve_credential(&self, credential: Option<&str>) -> Result<String> {
        credential
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .or_else(|| self.store.primary_key())
            .ok_or_else(|| Error::InvalidInput("No API key configured".to_string()))
    }

    /// Mark the pipeline busy; fails when a submission is already outstanding
    fn acquire(&self) -> Result<()> {
        if self.busy_tx.send_if_modified(|busy| !std::mem::replace(busy, true)) {
            Ok(())
        } else {
            Err(Error::InvalidInput("Submission already in progress".to_string()))
        }
    }

    fn fail(&self, prefix: &str, error: &Error) {
        let reason = error.server_message().unwrap_or(UNKNOWN_ERROR_MESSAGE);
        self.bus.notify(Severity::Error, format!("{}: {}", prefix, reason));
    }

    /// Submit a batch over the streaming endpoint
    ///
    /// Per-item failures are reported through the progress list; the
    /// returned error is reserved for submissions that never started.
    pub async fn submit(&self, credential: Option<&str>, input: &IpInput) -> Result<IngestReport> {
        if input.is_blank() {
            return Err(Error::InvalidInput("No IP addresses to submit".to_string()));
        }
        let credential = self.resolve_credential(credential)?;
        self.acquire()?;
        let submission_id = Uuid::new_v4();

        self.progress_tx.send_modify(StreamingProgress::clear);
        info!(%submission_id, lines = input.lines().count(), "Starting streamed submission");

        let mut stream = match self.api.open_stream(&credential, input.payload()).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(%submission_id, "Failed to open enrichment stream: {}", e);
                self.busy_tx.send_replace(false);
                self.fail("Failed to submit IPs", &e);
                return Err(e);
            }
        };
        self.busy_tx.send_replace(false);
        debug!(%submission_id, "Stream open, input consumed");

        let mut aborted = false;
        loop {
            let next = match self.completion {
                StreamCompletion::ServerClose => stream.next().await,
                StreamCompletion::IdleTimeout(idle) => match tokio::time::timeout(idle, stream.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        debug!(%submission_id, ?idle, "Stream idle, stopping consumption");
                        break;
                    }
                },
            };

            let message = match next {
                None => break,
                Some(Ok(message)) => message,
                Some(Err(e)) => {
                    warn!(%submission_id, "Enrichment stream failed: {}", e);
                    self.fail("Failed to submit IPs", &e);
                    aborted = true;
                    break;
                }
            };

            let mut effect = ProgressEffect::None;
            self.progress_tx.send_modify(|progress| effect = progress.apply(&message));

            match effect {
                ProgressEffect::None => {}
                ProgressEffect::Refetch => {
                    // Failure already notified by the table; keep consuming.
                    let _ = self.table.refresh().await;
                }
                ProgressEffect::Abort(error) => {
                    warn!(%submission_id, "Batch rejected by server: {}", error);
                    self.bus
                        .notify(Severity::Error, format!("Failed to submit IPs: {}", error));
                    aborted = true;
                    break;
                }
            }
        }

        let report = IngestReport::from_progress(submission_id, &self.progress_tx.borrow(), aborted);
        info!(
            %submission_id,
            enriched = report.enriched,
            failed = report.failed,
            processing = report.processing,
            aborted,
            "Streamed submission finished"
        );
        Ok(report)
    }

    /// Submit a batch over the non-streaming endpoint
    pub async fn submit_legacy(&self, credential: Option<&str>, input: &IpInput) -> Result<IngestReport> {
        if input.is_blank() {
            return Err(Error::InvalidInput("No IP addresses to submit".to_string()));
        }
        let credential = self.resolve_credential(credential)?;
        let submission_id = Uuid::new_v4();
        let prefix = match input {
            IpInput::Text(_) => "Failed to submit IPs",
            IpInput::File { .. } => "Failed to submit IPs from file",
        };

        self.acquire()?;
        let result = self.api.submit_ips(&credential, input).await;
        self.busy_tx.send_replace(false);

        let report = match result {
            Ok(report) => report,
            Err(e) => {
                warn!(%submission_id, "Legacy submission failed: {}", e);
                self.fail(prefix, &e);
                return Err(e);
            }
        };

        let _ = self.table.refresh().await;
        if !report.errors.is_empty() {
            self.bus.notify(
                Severity::Warning,
                format!("Completed with some errors: {}", report.errors.join(", ")),
            );
        }
        info!(
            %submission_id,
            enriched = report.enriched_ips.len(),
            errors = report.errors.len(),
            "Legacy submission finished"
        );

        Ok(IngestReport {
            submission_id,
            enriched: report.enriched_ips.len(),
            failed: report.errors.len(),
            processing: 0,
            aborted: false,
            errors: report.errors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::FakeApi;
    use crate::api::EnrichmentRecord;
    use crate::events::IntelEvent;
    use crate::ingest::StreamMessage;
    use crate::keys::{MemoryStorage, Provider};
    use serde_json::Map;

    struct Harness {
        api: Arc<FakeApi>,
        bus: EventBus,
        pipeline: IngestionPipeline,
    }

    fn harness(completion: StreamCompletion) -> Harness {
        let api = Arc::new(FakeApi::default());
        let bus = EventBus::new(32);
        let store = KeyStore::new(Arc::new(MemoryStorage::new()));
        store.set(Provider::Shodan, "shodan-key");
        let table = Arc::new(ResultTable::new(api.clone(), bus.clone()));
        let pipeline = IngestionPipeline::new(api.clone(), table, store, bus.clone(), completion);
        Harness { api, bus, pipeline }
    }

    fn enriched(ip: &str) -> std::result::Result<StreamMessage, &'static str> {
        Ok(StreamMessage::Enriched {
            ip_address: ip.to_string(),
            fields: Map::new(),
        })
    }

    fn processing(ip: &str) -> std::result::Result<StreamMessage, &'static str> {
        Ok(StreamMessage::Processing {
            ip_address: ip.to_string(),
        })
    }

    fn notifications(rx: &mut tokio::sync::broadcast::Receiver<IntelEvent>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let IntelEvent::Notification { message, .. } = event {
                out.push(message);
            }
        }
        out
    }

    #[tokio::test]
    async fn test_mixed_stream_refetches_once_per_enriched_item() {
        let h = harness(StreamCompletion::ServerClose);
        h.api
            .records
            .lock()
            .unwrap()
            .push(EnrichmentRecord::new(1, "8.8.8.8"));
        *h.api.stream_script.lock().unwrap() = vec![
            processing("8.8.8.8"),
            processing("10.0.0.1"),
            enriched("8.8.8.8"),
            Ok(StreamMessage::ItemError {
                ip_address: "10.0.0.1".to_string(),
                message: "Private address".to_string(),
            }),
        ];

        let report = h
            .pipeline
            .submit(None, &IpInput::text("8.8.8.8\n10.0.0.1"))
            .await
            .unwrap();

        assert_eq!(h.api.list_calls(), 1);
        assert_eq!(report.enriched, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.processing, 0);
        assert!(!report.aborted);
        assert_eq!(h.pipeline.table().len().await, 1);

        let progress = h.pipeline.progress();
        let ips: Vec<&str> = progress.items().iter().map(|i| i.ip_address.as_str()).collect();
        assert_eq!(ips, vec!["8.8.8.8", "10.0.0.1"]);
    }

    #[tokio::test]
    async fn test_single_address_transitions_in_place() {
        let h = harness(StreamCompletion::ServerClose);
        let mut states = h.pipeline.subscribe_progress();
        *h.api.stream_script.lock().unwrap() = vec![processing("8.8.8.8"), enriched("8.8.8.8")];

        h.pipeline.submit(None, &IpInput::text("8.8.8.8")).await.unwrap();

        assert!(states.has_changed().unwrap());
        let progress = states.borrow_and_update().clone();
        assert_eq!(progress.items().len(), 1);
        assert_eq!(progress.items()[0].status, ItemStatus::Enriched);
        assert_eq!(h.api.list_calls(), 1);
    }

    #[tokio::test]
    async fn test_idle_timeout_mode_still_ends_on_close() {
        let h = harness(StreamCompletion::IdleTimeout(Duration::from_millis(50)));
        *h.api.stream_script.lock().unwrap() = vec![processing("8.8.8.8")];

        let report = h.pipeline.submit(None, &IpInput::text("8.8.8.8")).await.unwrap();
        assert_eq!(report.processing, 1);
        assert!(!report.aborted);
    }

    #[tokio::test]
    async fn test_uses_primary_key_when_no_credential_given() {
        let h = harness(StreamCompletion::ServerClose);
        h.pipeline.submit(None, &IpInput::text("1.1.1.1")).await.unwrap();
        h.pipeline
            .submit(Some("explicit"), &IpInput::text("1.1.1.1"))
            .await
            .unwrap();

        let opened = h.api.opened_with.lock().unwrap().clone();
        assert_eq!(opened[0], ("shodan-key".to_string(), "1.1.1.1".to_string()));
        assert_eq!(opened[1].0, "explicit");
    }

    #[tokio::test]
    async fn test_batch_failure_stops_consumption() {
        let h = harness(StreamCompletion::ServerClose);
        let mut rx = h.bus.subscribe();
        *h.api.stream_script.lock().unwrap() = vec![
            Ok(StreamMessage::Failure {
                error: "Invalid API key".to_string(),
            }),
            enriched("8.8.8.8"),
        ];

        let report = h.pipeline.submit(None, &IpInput::text("8.8.8.8")).await.unwrap();
        assert!(report.aborted);
        assert_eq!(h.api.list_calls(), 0);
        assert_eq!(notifications(&mut rx), vec!["Failed to submit IPs: Invalid API key"]);
        assert!(!h.pipeline.is_busy());
    }

    #[tokio::test]
    async fn test_transport_error_keeps_partial_results() {
        let h = harness(StreamCompletion::ServerClose);
        let mut rx = h.bus.subscribe();
        *h.api.stream_script.lock().unwrap() =
            vec![enriched("8.8.8.8"), processing("1.1.1.1"), Err("connection reset")];

        let report = h
            .pipeline
            .submit(None, &IpInput::text("8.8.8.8\n1.1.1.1"))
            .await
            .unwrap();
        assert!(report.aborted);
        assert_eq!(report.enriched, 1);
        assert_eq!(report.processing, 1);
        assert_eq!(notifications(&mut rx).len(), 1);
    }

    #[tokio::test]
    async fn test_open_failure_clears_busy_and_notifies() {
        let h = harness(StreamCompletion::ServerClose);
        let mut rx = h.bus.subscribe();
        *h.api.open_failure.lock().unwrap() = Some((401, Some("Invalid API key")));

        assert!(h.pipeline.submit(None, &IpInput::text("8.8.8.8")).await.is_err());
        assert!(!h.pipeline.is_busy());
        assert_eq!(notifications(&mut rx), vec!["Failed to submit IPs: Invalid API key"]);
    }

    #[tokio::test]
    async fn test_blank_input_rejected_before_any_request() {
        let h = harness(StreamCompletion::ServerClose);
        let result = h.pipeline.submit(None, &IpInput::text(" \n ")).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert!(h.api.opened_with.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_submission_refused_while_busy() {
        let h = harness(StreamCompletion::ServerClose);
        h.pipeline.busy_tx.send_replace(true);

        let streamed = h.pipeline.submit(None, &IpInput::text("8.8.8.8")).await;
        assert!(matches!(streamed, Err(Error::InvalidInput(_))));
        let legacy = h.pipeline.submit_legacy(None, &IpInput::text("8.8.8.8")).await;
        assert!(matches!(legacy, Err(Error::InvalidInput(_))));
        assert!(h.api.opened_with.lock().unwrap().is_empty());
        assert!(h.pipeline.is_busy());

        h.pipeline.busy_tx.send_replace(false);
        h.pipeline.submit(None, &IpInput::text("8.8.8.8")).await.unwrap();
        assert!(!h.pipeline.is_busy());
    }

    #[tokio::test]
    async fn test_new_submission_clears_previous_items() {
        let h = harness(StreamCompletion::ServerClose);
        *h.api.stream_script.lock().unwrap() = vec![processing("8.8.8.8")];
        h.pipeline.submit(None, &IpInput::text("8.8.8.8")).await.unwrap();
        assert_eq!(h.pipeline.progress().items().len(), 1);

        *h.api.stream_script.lock().unwrap() = vec![processing("1.1.1.1")];
        h.pipeline.submit(None, &IpInput::text("1.1.1.1")).await.unwrap();
        let progress = h.pipeline.progress();
        assert_eq!(progress.items().len(), 1);
        assert_eq!(progress.items()[0].ip_address, "1.1.1.1");
    }

    #[tokio::test]
    async fn test_legacy_submission_reports_partial_errors() {
        let h = harness(StreamCompletion::ServerClose);
        let mut rx = h.bus.subscribe();

        let report = h
            .pipeline
            .submit_legacy(None, &IpInput::text("8.8.8.8\nnot-an-ip"))
            .await
            .unwrap();
        assert_eq!(report.enriched, 1);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(h.api.list_calls(), 1);
        assert_eq!(h.pipeline.table().len().await, 1);

        let messages = notifications(&mut rx);
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("Completed with some errors: Skipping invalid input"));
    }
}
