//! Error types for cm-core

use thiserror::Error;

/// Main error type for cm-core
#[derive(Error, Debug)]
pub enum Error {
    /// Every connection attempt to the endpoint failed
    #[error("Connection to {endpoint} failed after {attempts} attempts: {reason}")]
    ConnectionExhausted {
        /// Endpoint with credentials redacted
        endpoint: String,
        attempts: u32,
        /// Error reported by the last attempt
        reason: String,
    },

    /// A single connection attempt failed (retried by the connector)
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Malformed record for session {session_id}: {reason}")]
    MalformedRecord { session_id: String, reason: String },

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for cm-core
pub type Result<T> = std::result::Result<T, Error>;
