//! Transport traits and candidate type

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use super::TransportError;

/// A (port, bit-rate) pair probed once by adapter discovery
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransportCandidate {
    pub port: String,
    pub baud_rate: u32,
}

impl TransportCandidate {
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
        }
    }
}

impl fmt::Display for TransportCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.port, self.baud_rate)
    }
}

/// An open byte-stream link to a diagnostic adapter.
///
/// Owned by exactly one protocol channel; methods take `&mut self` so
/// only one exchange can be in flight.
#[async_trait]
pub trait ByteTransport: Send {
    /// The candidate this transport was opened with
    fn candidate(&self) -> &TransportCandidate;

    /// Discard any unread input
    async fn clear_input(&mut self) -> Result<(), TransportError>;

    /// Write all bytes
    async fn write(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Read whatever arrives within `wait`.
    ///
    /// Returns an empty buffer when nothing arrived; that is not an error.
    async fn read_available(&mut self, wait: Duration) -> Result<Vec<u8>, TransportError>;

    /// Close the link. Closing twice is a no-op.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Enumerates and opens transports for discovery
#[async_trait]
pub trait TransportOpener: Send + Sync {
    /// Identifiers of the ports currently present
    async fn list_ports(&self) -> Result<Vec<String>, TransportError>;

    /// Open a candidate with fixed 8N1 framing and control lines asserted
    async fn open(
        &self,
        candidate: &TransportCandidate,
    ) -> Result<Box<dyn ByteTransport>, TransportError>;
}
