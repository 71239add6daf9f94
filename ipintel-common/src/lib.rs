//! # IP Intelligence Common Library
//!
//! Client-side core for the IP intelligence dashboard:
//! - Provider credential storage and aggregate key state
//! - API key validation workflow
//! - Streaming IP ingestion against the remote enrichment service
//! - Canonical result table (filters, selection, optimistic delete, CSV export)
//! - Event types (IntelEvent enum) and EventBus
//! - Configuration loading

pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod ingest;
pub mod keys;
pub mod results;
pub mod sse;
pub mod validation;

pub use error::{Error, Result};
pub use keys::Provider;
