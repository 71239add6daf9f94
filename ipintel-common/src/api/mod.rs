//! Remote enrichment service: wire types, client contract and HTTP client

pub mod client;
#[cfg(test)]
pub(crate) mod fake;
pub mod http;
pub mod types;

pub use client::{EnrichmentApi, MessageStream};
pub use http::HttpEnrichmentApi;
pub use types::{ApiInfo, CreditValue, EnrichmentRecord, SubmitReport, SubmittedRecord, API_KEY_HEADER};
