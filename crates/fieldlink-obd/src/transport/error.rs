//! Transport layer errors

use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum TransportError {
    #[error("Failed to open {port}: {reason}")]
    OpenFailed { port: String, reason: String },

    #[error("Port enumeration failed: {0}")]
    EnumerationFailed(String),

    #[error("Transport closed")]
    Closed,

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Transport not supported: {0}")]
    Unsupported(String),
}
