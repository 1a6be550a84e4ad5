//! Error types for collector client operations

use fieldlink_core::CollectorError;
use thiserror::Error;

/// Result type alias for collector client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur while talking to the collector
#[derive(Error, Debug)]
pub enum ClientError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Server returned an error response
    #[error("Server error {status}: {message}")]
    ServerError { status: u16, message: String },

    /// Failed to parse response
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// Session not found
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Timeout
    #[error("Request timed out")]
    Timeout,
}

impl ClientError {
    /// Create a server error from status code and message
    pub fn server_error(status: u16, message: impl Into<String>) -> Self {
        Self::ServerError {
            status,
            message: message.into(),
        }
    }
}

impl From<ClientError> for CollectorError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::HttpError(e) if e.is_timeout() => CollectorError::Timeout,
            ClientError::HttpError(e) if e.is_decode() => {
                CollectorError::InvalidResponse(e.to_string())
            }
            ClientError::HttpError(e) => CollectorError::Unreachable(e.to_string()),
            ClientError::InvalidUrl(e) => CollectorError::Unreachable(e.to_string()),
            ClientError::IoError(e) => CollectorError::Unreachable(e.to_string()),
            ClientError::ServerError { status, message } => {
                CollectorError::Rejected { status, message }
            }
            ClientError::ParseError(message) => CollectorError::InvalidResponse(message),
            ClientError::SessionNotFound(message) => CollectorError::UnknownSession(message),
            ClientError::Timeout => CollectorError::Timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_error_becomes_rejected() {
        let err: CollectorError = ClientError::server_error(500, "database down").into();
        assert!(matches!(
            err,
            CollectorError::Rejected { status: 500, ref message } if message == "database down"
        ));
    }

    #[test]
    fn test_session_not_found_becomes_unknown_session() {
        let err: CollectorError = ClientError::SessionNotFound("s-9".into()).into();
        assert!(matches!(err, CollectorError::UnknownSession(_)));
    }

    #[test]
    fn test_timeout_maps_directly() {
        let err: CollectorError = ClientError::Timeout.into();
        assert!(matches!(err, CollectorError::Timeout));
    }
}
