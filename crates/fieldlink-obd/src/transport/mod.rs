//! Transport layer for diagnostic adapters
//!
//! - Serial adapter (USB and Bluetooth SPP ELM327-style dongles)
//! - Mock adapter emulating an ELM327 for demos and tests

mod adapter;
pub mod error;
pub mod mock;

#[cfg(feature = "serial")]
pub mod serial;

pub use adapter::{ByteTransport, TransportCandidate, TransportOpener};
pub use error::TransportError;

use std::sync::Arc;

use crate::config::{DiscoveryConfig, TransportConfig};

/// Create a transport opener based on configuration
pub fn create_opener(
    config: &TransportConfig,
    discovery: &DiscoveryConfig,
) -> Result<Arc<dyn TransportOpener>, TransportError> {
    match config {
        #[cfg(feature = "serial")]
        TransportConfig::Serial => Ok(Arc::new(serial::SerialOpener::new(
            std::time::Duration::from_millis(discovery.io_timeout_ms),
        ))),
        #[cfg(not(feature = "serial"))]
        TransportConfig::Serial => {
            let _ = discovery;
            Err(TransportError::Unsupported(
                "Serial transport requires the 'serial' feature".to_string(),
            ))
        }
        TransportConfig::Mock(cfg) => Ok(Arc::new(mock::MockOpener::emulated(cfg))),
    }
}
