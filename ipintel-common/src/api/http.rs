//! HTTP implementation of the enrichment service contract

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response};
use tracing::{debug, warn};

use super::client::{EnrichmentApi, MessageStream};
use super::types::{
    ApiInfo, BulkDeleteRequest, EnrichmentRecord, ErrorBody, IpsRequest, SubmitBody, SubmitReport,
    ValidateKeyRequest, ValidateKeyResponse, API_KEY_HEADER,
};
use crate::ingest::{IpInput, StreamMessage};
use crate::{sse, Error, Result};

const USER_AGENT: &str = concat!("ipintel/", env!("CARGO_PKG_VERSION"));

/// Client for the enrichment service rooted at `base_url` (e.g. `http://localhost:5001/api`)
#[derive(Clone)]
pub struct HttpEnrichmentApi {
    http: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
}

impl HttpEnrichmentApi {
    /// `request_timeout` bounds request/response calls; the ingestion stream is
    /// not subject to it.
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            request_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.timeout(self.request_timeout).send().await?;
        check_status(response).await
    }
}

/// Map a non-success response to `Error::Remote`, keeping the server's `error` text
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body).ok().map(|b| b.error);
    warn!(
        status_code = status.as_u16(),
        message = message.as_deref().unwrap_or(""),
        "Remote service returned an error"
    );
    Err(Error::Remote {
        status: status.as_u16(),
        message,
    })
}

/// Decode one event; byte-stream errors pass through, undecodable payloads are skipped
fn to_message(event: Result<sse::SseEvent>) -> Option<Result<StreamMessage>> {
    match event {
        Ok(event) => match StreamMessage::parse(&event.data) {
            Ok(message) => Some(Ok(message)),
            Err(e) => {
                warn!(data = %event.data, "Skipping stream message: {}", e);
                None
            }
        },
        Err(e) => Some(Err(e)),
    }
}

#[async_trait]
impl EnrichmentApi for HttpEnrichmentApi {
    async fn list_ips(&self) -> Result<Vec<EnrichmentRecord>> {
        let response = self.send(self.http.get(self.url("ips"))).await?;
        let records: Vec<EnrichmentRecord> = response.json().await?;
        debug!(count = records.len(), "Fetched enrichment records");
        Ok(records)
    }

    async fn submit_ips(&self, credential: &str, input: &IpInput) -> Result<SubmitReport> {
        let request = self
            .http
            .post(self.url("ips"))
            .header(API_KEY_HEADER, credential);

        let request = match input {
            IpInput::Text(text) => request.json(&IpsRequest { ips: text.clone() }),
            IpInput::File { name, content } => {
                let part = Part::text(content.clone()).file_name(name.clone());
                request.multipart(Form::new().part("file", part))
            }
        };

        let response = self.send(request).await?;
        let body: SubmitBody = response.json().await?;
        Ok(body.into())
    }

    async fn open_stream(&self, credential: &str, ips: &str) -> Result<MessageStream> {
        // No request timeout: the connection lives as long as the server keeps it open
        let response = self
            .http
            .post(self.url("ips/stream"))
            .header(API_KEY_HEADER, credential)
            .header(ACCEPT, "text/event-stream")
            .json(&IpsRequest { ips: ips.to_string() })
            .send()
            .await?;
        let response = check_status(response).await?;
        debug!("Ingestion stream opened");

        let messages = sse::decode(response.bytes_stream()).filter_map(|event| async move { to_message(event) });
        Ok(messages.boxed())
    }

    async fn validate_api_key(&self, api_key: &str) -> Result<bool> {
        let request = self.http.post(self.url("validate-api-key")).json(&ValidateKeyRequest {
            api_key: api_key.to_string(),
        });
        let response = self.send(request).await?;
        let body: ValidateKeyResponse = response.json().await?;
        Ok(body.is_valid)
    }

    async fn delete_ip(&self, id: i64) -> Result<()> {
        self.send(self.http.delete(self.url(&format!("ips/{}", id))))
            .await
            .map_err(|e| match e {
                Error::Remote { status: 404, .. } => Error::NotFound(format!("IP record {}", id)),
                other => other,
            })?;
        Ok(())
    }

    async fn bulk_delete(&self, ids: &[i64]) -> Result<()> {
        let request = self
            .http
            .post(self.url("ips/bulk-delete"))
            .json(&BulkDeleteRequest { ids: ids.to_vec() });
        self.send(request).await?;
        Ok(())
    }

    async fn api_info(&self, credential: &str) -> Result<ApiInfo> {
        let request = self
            .http
            .get(self.url("api-info"))
            .header(API_KEY_HEADER, credential);
        let response = self.send(request).await?;
        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joining() {
        let api = HttpEnrichmentApi::new("http://localhost:5001/api/", Duration::from_secs(5)).unwrap();
        assert_eq!(api.base_url(), "http://localhost:5001/api");
        assert_eq!(api.url("ips"), "http://localhost:5001/api/ips");
        assert_eq!(api.url("/ips/bulk-delete"), "http://localhost:5001/api/ips/bulk-delete");
    }

    fn event(data: &str) -> Result<sse::SseEvent> {
        Ok(sse::SseEvent {
            data: data.to_string(),
            ..Default::default()
        })
    }

    #[test]
    fn test_undecodable_events_are_skipped() {
        assert!(to_message(event(r#"{"message":"heartbeat"}"#)).is_none());
        assert!(to_message(event("not json")).is_none());
        assert!(to_message(event(r#"{"status":"enriched"}"#)).is_none());

        match to_message(event(r#"{"ip":"8.8.8.8","status":"processing"}"#)) {
            Some(Ok(StreamMessage::Processing { ip_address })) => assert_eq!(ip_address, "8.8.8.8"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(to_message(event(r#"{"error":"Invalid API key"}"#)), Some(Ok(StreamMessage::Failure { .. }))));
    }

    #[test]
    fn test_transport_errors_pass_through() {
        let failed = to_message(Err(Error::Internal("connection reset".to_string())));
        assert!(matches!(failed, Some(Err(Error::Internal(_)))));
    }
}
