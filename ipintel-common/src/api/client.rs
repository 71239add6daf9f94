//! Remote enrichment service contract

use async_trait::async_trait;
use futures::stream::BoxStream;

use super::types::{ApiInfo, EnrichmentRecord, SubmitReport};
use crate::ingest::{IpInput, StreamMessage};
use crate::Result;

/// Lazy, finite, non-restartable sequence of stream messages
///
/// Ends when the server closes the connection; yields one `Err` on
/// transport failure and then ends.
pub type MessageStream = BoxStream<'static, Result<StreamMessage>>;

/// Operations the client needs from the remote enrichment service
///
/// `credential` is the provider key sent in the `X-API-Key` header.
#[async_trait]
pub trait EnrichmentApi: Send + Sync {
    /// `GET /ips`
    async fn list_ips(&self) -> Result<Vec<EnrichmentRecord>>;

    /// `POST /ips` (legacy, non-streaming)
    async fn submit_ips(&self, credential: &str, input: &IpInput) -> Result<SubmitReport>;

    /// `POST /ips/stream`
    async fn open_stream(&self, credential: &str, ips: &str) -> Result<MessageStream>;

    /// `POST /validate-api-key`
    async fn validate_api_key(&self, api_key: &str) -> Result<bool>;

    /// `DELETE /ips/{id}`
    async fn delete_ip(&self, id: i64) -> Result<()>;

    /// `POST /ips/bulk-delete`
    async fn bulk_delete(&self, ids: &[i64]) -> Result<()>;

    /// `GET /api-info`
    async fn api_info(&self, credential: &str) -> Result<ApiInfo>;
}
