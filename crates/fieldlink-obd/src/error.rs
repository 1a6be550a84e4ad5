//! Vehicle link error types

use thiserror::Error;

use crate::transport::TransportError;

/// Adapter discovery errors
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Failed to enumerate serial ports: {0}")]
    Enumeration(#[source] TransportError),

    #[error("No adapter answered on {candidates} candidate(s)")]
    NotFound { candidates: usize },
}

/// Vehicle link engine errors
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("Disconnect in progress")]
    DisconnectInProgress,

    #[error("Transport setup failed: {0}")]
    Transport(#[from] TransportError),
}

pub type LinkResult<T> = Result<T, LinkError>;
