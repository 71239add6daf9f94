//! Canonical result table
//!
//! Holds the authoritative record list as last fetched from the remote
//! service, plus the view state layered on top of it (column filters and
//! row selection). Deletes are optimistic and roll back on failure.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::csv::to_csv;
use super::filter::{Column, ColumnFilters};
use super::optimistic::optimistic_remove;
use super::selection::{SelectAllState, Selection};
use crate::api::{EnrichmentApi, EnrichmentRecord};
use crate::events::{EventBus, Severity};
use crate::{Error, Result};

pub const FETCH_FAILED_MESSAGE: &str = "Failed to fetch IPs. Please try again later.";
pub const DELETE_FAILED_MESSAGE: &str = "Failed to delete IP. Please try again later.";
pub const BULK_DELETE_FAILED_MESSAGE: &str = "Failed to delete selected IPs. Please try again later.";

pub struct ResultTable {
    api: Arc<dyn EnrichmentApi>,
    bus: EventBus,
    records: Mutex<Vec<EnrichmentRecord>>,
    filters: Mutex<ColumnFilters>,
    selection: Mutex<Selection>,
}

impl ResultTable {
    pub fn new(api: Arc<dyn EnrichmentApi>, bus: EventBus) -> Self {
        Self {
            api,
            bus,
            records: Mutex::new(Vec::new()),
            filters: Mutex::new(ColumnFilters::new()),
            selection: Mutex::new(Selection::new()),
        }
    }

    /// Replace the canonical list with a fresh fetch
    ///
    /// On failure the previous list is kept and a notification is emitted.
    pub async fn refresh(&self) -> Result<usize> {
        let fetched = match self.api.list_ips().await {
            Ok(records) => records,
            Err(e) => {
                warn!("Error fetching IPs: {}", e);
                self.bus.notify(Severity::Error, FETCH_FAILED_MESSAGE);
                return Err(e);
            }
        };

        let existing: BTreeSet<i64> = fetched.iter().map(|r| r.id).collect();
        let count = fetched.len();
        *self.records.lock().await = fetched;
        self.selection.lock().await.retain_existing(&existing);

        debug!(count, "Canonical list replaced");
        Ok(count)
    }

    /// Full unfiltered list
    pub async fn records(&self) -> Vec<EnrichmentRecord> {
        self.records.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }

    /// Rows passing every column filter
    pub async fn visible(&self) -> Vec<EnrichmentRecord> {
        let filters = self.filters.lock().await.clone();
        self.records
            .lock()
            .await
            .iter()
            .filter(|r| filters.matches(r))
            .cloned()
            .collect()
    }

    async fn visible_ids(&self) -> Vec<i64> {
        self.visible().await.iter().map(|r| r.id).collect()
    }

    pub async fn set_filter(&self, column: Column, text: &str) {
        self.filters.lock().await.set(column, text);
    }

    pub async fn clear_filters(&self) {
        self.filters.lock().await.clear();
    }

    pub async fn toggle_selected(&self, id: i64) {
        self.selection.lock().await.toggle(id);
    }

    /// Header checkbox: select or clear every visible row
    pub async fn toggle_all_visible(&self) {
        let visible = self.visible_ids().await;
        self.selection.lock().await.toggle_all(&visible);
    }

    pub async fn select_all_state(&self) -> SelectAllState {
        let visible = self.visible_ids().await;
        self.selection.lock().await.state_for(&visible)
    }

    pub async fn selected_ids(&self) -> Vec<i64> {
        self.selection.lock().await.ids()
    }

    /// Delete one record, optimistically
    pub async fn delete(&self, id: i64) -> Result<()> {
        if !self.records.lock().await.iter().any(|r| r.id == id) {
            return Err(Error::NotFound(format!("IP record {}", id)));
        }

        let api = self.api.clone();
        let result = optimistic_remove(&self.records, |r| r.id == id, async move {
            api.delete_ip(id).await
        })
        .await;

        match result {
            Ok(_) => {
                let current = self.current_ids().await;
                self.selection.lock().await.retain_existing(&current);
                info!(id, "Deleted IP record");
                Ok(())
            }
            Err(e) => {
                self.bus.notify(Severity::Error, DELETE_FAILED_MESSAGE);
                Err(e)
            }
        }
    }

    /// Delete every selected record still present, optimistically
    ///
    /// Returns the number of records removed.
    pub async fn bulk_delete_selected(&self) -> Result<usize> {
        let current = self.current_ids().await;
        let ids: Vec<i64> = self
            .selection
            .lock()
            .await
            .ids()
            .into_iter()
            .filter(|id| current.contains(id))
            .collect();
        if ids.is_empty() {
            return Ok(0);
        }

        let targets: BTreeSet<i64> = ids.iter().copied().collect();
        let api = self.api.clone();
        let request_ids = ids.clone();
        let result = optimistic_remove(&self.records, |r| targets.contains(&r.id), async move {
            api.bulk_delete(&request_ids).await
        })
        .await;

        match result {
            Ok(removed) => {
                let current = self.current_ids().await;
                self.selection.lock().await.retain_existing(&current);
                info!(count = removed.len(), "Bulk deleted IP records");
                self.bus.notify(
                    Severity::Success,
                    format!("Deleted {} IP address(es).", removed.len()),
                );
                Ok(removed.len())
            }
            Err(e) => {
                self.bus.notify(Severity::Error, BULK_DELETE_FAILED_MESSAGE);
                Err(e)
            }
        }
    }

    async fn current_ids(&self) -> BTreeSet<i64> {
        self.records.lock().await.iter().map(|r| r.id).collect()
    }

    /// Pretty-printed JSON of one record
    pub async fn details(&self, id: i64) -> Result<String> {
        let records = self.records.lock().await;
        let record = records
            .iter()
            .find(|r| r.id == id)
            .ok_or_else(|| Error::NotFound(format!("IP record {}", id)))?;
        Ok(serde_json::to_string_pretty(record)?)
    }

    /// CSV of the full unfiltered list
    pub async fn export_csv(&self) -> String {
        to_csv(&self.records.lock().await)
    }

    pub async fn write_csv(&self, path: &Path) -> Result<usize> {
        let records = self.records().await;
        tokio::fs::write(path, to_csv(&records)).await?;
        info!(count = records.len(), path = %path.display(), "Exported CSV");
        Ok(records.len())
    }
}
