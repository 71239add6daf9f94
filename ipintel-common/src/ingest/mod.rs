//! IP batch ingestion: input, stream messages, progress and the pipeline

pub mod input;
pub mod message;
pub mod pipeline;
pub mod progress;

pub use input::IpInput;
pub use message::StreamMessage;
pub use pipeline::{IngestReport, IngestionPipeline, StreamCompletion};
pub use progress::{ItemStatus, ProgressEffect, StreamingItem, StreamingProgress};
