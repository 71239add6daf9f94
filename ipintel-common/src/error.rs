//! Common error types for the IP intelligence client

use thiserror::Error;

/// Common result type for client operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the client library
#[derive(Error, Debug)]
pub enum Error {
    /// Key-value storage failure (quota exceeded, unwritable file)
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transport-level failure talking to the remote service
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Remote service answered with a non-success status
    #[error("Remote error {status}: {}", message.as_deref().unwrap_or("no details"))]
    Remote {
        /// HTTP status code
        status: u16,
        /// Server-supplied `error` text, if the body carried one
        message: Option<String>,
    },

    /// Malformed payload (JSON, event-stream framing)
    #[error("Decode error: {0}")]
    Decode(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Message the remote service supplied for this failure, if any
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Error::Remote { message, .. } => message.as_deref(),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Decode(e.to_string())
    }
}
