//! Scriptable in-memory stand-in for the remote service (unit tests only)

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use futures::StreamExt;

use super::client::{EnrichmentApi, MessageStream};
use super::types::{ApiInfo, CreditValue, EnrichmentRecord, SubmitReport};
use crate::ingest::{IpInput, StreamMessage};
use crate::{Error, Result};

fn remote(status: u16, message: Option<&str>) -> Error {
    Error::Remote {
        status,
        message: message.map(str::to_string),
    }
}

#[derive(Default)]
pub(crate) struct FakeApi {
    pub records: Mutex<Vec<EnrichmentRecord>>,
    pub list_calls: AtomicUsize,
    pub fail_list: AtomicBool,
    pub fail_delete: AtomicBool,
    pub deleted: Mutex<Vec<i64>>,
    pub valid_keys: Mutex<Vec<String>>,
    pub validate_calls: AtomicUsize,
    /// Status and optional server message returned by validation
    pub validate_failure: Mutex<Option<(u16, Option<&'static str>)>>,
    pub open_failure: Mutex<Option<(u16, Option<&'static str>)>>,
    pub stream_script: Mutex<Vec<std::result::Result<StreamMessage, &'static str>>>,
    pub opened_with: Mutex<Vec<(String, String)>>,
}

impl FakeApi {
    pub fn with_records(records: Vec<EnrichmentRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            ..Self::default()
        }
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EnrichmentApi for FakeApi {
    async fn list_ips(&self) -> Result<Vec<EnrichmentRecord>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(remote(500, None));
        }
        Ok(self.records.lock().unwrap().clone())
    }

    async fn submit_ips(&self, _credential: &str, input: &IpInput) -> Result<SubmitReport> {
        let mut report = SubmitReport::default();
        let mut records = self.records.lock().unwrap();
        for line in input.lines() {
            if line.parse::<std::net::IpAddr>().is_ok() {
                let record = EnrichmentRecord::new(records.len() as i64 + 1, line);
                records.push(record.clone());
                report.enriched_ips.push((&record).into());
            } else {
                report
                    .errors
                    .push(format!("Skipping invalid input: '{}' is not a valid IP address.", line));
            }
        }
        Ok(report)
    }

    async fn open_stream(&self, credential: &str, ips: &str) -> Result<MessageStream> {
        self.opened_with
            .lock()
            .unwrap()
            .push((credential.to_string(), ips.to_string()));
        if let Some((status, message)) = *self.open_failure.lock().unwrap() {
            return Err(remote(status, message));
        }
        let script: Vec<Result<StreamMessage>> = std::mem::take(&mut *self.stream_script.lock().unwrap())
            .into_iter()
            .map(|item| item.map_err(|e| Error::Internal(e.to_string())))
            .collect();
        Ok(futures::stream::iter(script).boxed())
    }

    async fn validate_api_key(&self, api_key: &str) -> Result<bool> {
        self.validate_calls.fetch_add(1, Ordering::SeqCst);
        if let Some((status, message)) = *self.validate_failure.lock().unwrap() {
            return Err(remote(status, message));
        }
        Ok(self.valid_keys.lock().unwrap().iter().any(|k| k == api_key))
    }

    async fn delete_ip(&self, id: i64) -> Result<()> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(remote(500, Some("database unavailable")));
        }
        self.records.lock().unwrap().retain(|r| r.id != id);
        self.deleted.lock().unwrap().push(id);
        Ok(())
    }

    async fn bulk_delete(&self, ids: &[i64]) -> Result<()> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(remote(500, Some("database unavailable")));
        }
        self.records.lock().unwrap().retain(|r| !ids.contains(&r.id));
        self.deleted.lock().unwrap().extend_from_slice(ids);
        Ok(())
    }

    async fn api_info(&self, _credential: &str) -> Result<ApiInfo> {
        Ok(ApiInfo {
            plan: "dev".to_string(),
            query_credits: CreditValue::Count(100),
            scan_credits: CreditValue::Text("N/A".to_string()),
        })
    }
}
