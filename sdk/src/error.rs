//! Error types for the MarginDash shipper
//!
//! Nothing in here is ever surfaced to producers calling `enqueue`/`track`.
//! `ShipperError` covers construction and configuration; `TransportError`
//! is what a single send attempt fails with.

use thiserror::Error;

/// Result type alias for shipper operations
pub type Result<T> = std::result::Result<T, ShipperError>;

/// Main error type for the shipper
#[derive(Error, Debug)]
pub enum ShipperError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Component could not be built (HTTP client, runtime, ...)
    #[error("initialization failed: {0}")]
    Init(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Metrics error
    #[error("metrics error: {0}")]
    Metrics(String),

    /// Operation attempted after shutdown
    #[error("shipper is shut down")]
    Shutdown,
}

/// Error raised by one send attempt of a `BatchTransport`
///
/// Every variant is treated as retryable by the retry executor: the far end
/// never gave a per-event verdict, so resending cannot double-apply anything.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Transport could not be initialized
    #[error("initialization failed: {0}")]
    Init(String),

    /// Could not reach the collector
    #[error("connection error: {0}")]
    Connection(String),

    /// Request timed out
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Request was sent but the exchange failed
    #[error("send failed: {0}")]
    Send(String),

    /// Transport is shutting down
    #[error("shutdown error: {0}")]
    Shutdown(String),
}

impl From<TransportError> for ShipperError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Init(msg) => ShipperError::Init(msg),
            TransportError::Shutdown(_) => ShipperError::Shutdown,
            other => ShipperError::Init(other.to_string()),
        }
    }
}
