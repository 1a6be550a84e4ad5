//! Serialized request/response exchanges over a byte transport

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, trace};

use super::{classify, Response, ResponseKind};
use crate::config::ChannelConfig;
use crate::transport::{ByteTransport, TransportCandidate, TransportError};

/// Consecutive communication errors, shared between a channel and its owner
#[derive(Debug, Default)]
pub struct ErrorCounter(AtomicU32);

impl ErrorCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one failure and return the new count
    pub fn increment(&self) -> u32 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn reset(&self) {
        self.0.store(0, Ordering::SeqCst);
    }

    pub fn get(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Protocol channel errors
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("No response terminator for '{command}' within {waited:?}")]
    Timeout { command: String, waited: Duration },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Channel closed")]
    Closed,
}

impl ChannelError {
    /// The classification equivalent of this failure
    pub fn kind(&self) -> Option<ResponseKind> {
        match self {
            Self::Timeout { .. } => Some(ResponseKind::Timeout),
            _ => None,
        }
    }
}

/// Owns one transport and runs one command at a time over it.
///
/// `send` takes `&mut self`, so exchanges are serialized by construction.
pub struct ProtocolChannel {
    transport: Box<dyn ByteTransport>,
    config: ChannelConfig,
    errors: Arc<ErrorCounter>,
    open: bool,
}

impl ProtocolChannel {
    pub fn new(
        transport: Box<dyn ByteTransport>,
        config: ChannelConfig,
        errors: Arc<ErrorCounter>,
    ) -> Self {
        Self {
            transport,
            config,
            errors,
            open: true,
        }
    }

    /// Report to a different error counter from now on
    pub fn with_errors(mut self, errors: Arc<ErrorCounter>) -> Self {
        self.errors = errors;
        self
    }

    pub fn candidate(&self) -> &TransportCandidate {
        self.transport.candidate()
    }

    pub fn errors(&self) -> &Arc<ErrorCounter> {
        &self.errors
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Send a command and wait for a classified response.
    ///
    /// Success of any kind (including `NO DATA` and adapter error markers)
    /// resets the shared error counter; timeouts and transport failures
    /// increment it.
    pub async fn send(&mut self, command: &str) -> Result<Response, ChannelError> {
        if !self.open {
            return Err(ChannelError::Closed);
        }

        match self.exchange(command).await {
            Ok(response) => {
                self.errors.reset();
                trace!(%command, kind = %response.kind, text = ?response.text, "Exchange complete");
                Ok(response)
            }
            Err(e) => {
                let count = self.errors.increment();
                debug!(%command, error = %e, consecutive_errors = count, "Exchange failed");
                Err(e)
            }
        }
    }

    async fn exchange(&mut self, command: &str) -> Result<Response, ChannelError> {
        self.transport.clear_input().await?;

        let mut line = Vec::with_capacity(command.len() + 1);
        line.extend_from_slice(command.as_bytes());
        line.push(b'\r');
        self.transport.write(&line).await?;

        let granularity = Duration::from_millis(self.config.poll_granularity_ms.max(1));
        let budget = Duration::from_millis(self.config.response_timeout_ms);
        let deadline = Instant::now() + budget;
        let mut buffer: Vec<u8> = Vec::new();

        for _ in 0..self.config.max_polls() {
            let chunk = self.transport.read_available(granularity).await?;
            if !chunk.is_empty() {
                buffer.extend_from_slice(&chunk);
                let text = String::from_utf8_lossy(&buffer);
                if let Some(kind) = classify(&text) {
                    return Ok(Response {
                        kind,
                        text: text.trim().to_string(),
                    });
                }
            }
            if Instant::now() >= deadline {
                break;
            }
        }

        Err(ChannelError::Timeout {
            command: command.to_string(),
            waited: budget,
        })
    }

    /// Close the underlying transport. Safe to call more than once.
    pub async fn close(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        if let Err(e) = self.transport.close().await {
            debug!(error = %e, "Error closing transport");
        }
    }
}
