//! Common error types for the collector interface

use thiserror::Error;

/// Result type for collector operations
pub type CollectorResult<T> = Result<T, CollectorError>;

/// Errors reported by a telemetry collector
#[derive(Debug, Error)]
pub enum CollectorError {
    /// Collector could not be reached
    #[error("Collector unreachable: {0}")]
    Unreachable(String),

    /// Collector rejected the request
    #[error("Collector rejected request ({status}): {message}")]
    Rejected {
        /// HTTP-like status code returned by the collector
        status: u16,
        /// Error message from the collector
        message: String,
    },

    /// Session is not known to the collector
    #[error("Unknown session: {0}")]
    UnknownSession(String),

    /// Request timed out
    #[error("Collector request timed out")]
    Timeout,

    /// Response could not be interpreted
    #[error("Invalid collector response: {0}")]
    InvalidResponse(String),
}
