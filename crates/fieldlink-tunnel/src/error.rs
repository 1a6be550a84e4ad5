//! Tunnel supervisor error types

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors from a tunnel connect attempt
#[derive(Debug, Error)]
pub enum TunnelError {
    /// The configuration artifact exists but cannot be used
    #[error("Tunnel configuration {path} is corrupt: {reason}")]
    CorruptConfig { path: PathBuf, reason: String },

    /// The artifact is still the generated template
    #[error("Tunnel configuration {0} has not been filled in")]
    NotConfigured(PathBuf),

    #[error("Tunnel client unavailable: {0}")]
    ClientUnavailable(String),

    #[error("Failed to launch tunnel client: {0}")]
    Launch(String),

    #[error("Tunnel client exited before the link came up (exit code {code:?})")]
    ProcessExited { code: Option<i32> },

    #[error("No tunnel interface detected within {0:?}")]
    DetectionTimeout(Duration),

    #[error("Tunnel connect abandoned for a disconnect")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type TunnelResult<T> = Result<T, TunnelError>;
