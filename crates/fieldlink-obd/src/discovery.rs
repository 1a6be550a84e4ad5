//! Adapter discovery
//!
//! Probes every (port, bit-rate) candidate in a deterministic order: ports
//! in configured (or enumerated) order, bit-rates in configured order for
//! each port. The first candidate whose reset response carries an adapter
//! signature wins; every rejected candidate's transport is closed before
//! the next one is opened.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::{ChannelConfig, DiscoveryConfig};
use crate::error::DiscoveryError;
use crate::protocol::{command, ErrorCounter, ProtocolChannel, PROMPT, VENDOR_MARKER};
use crate::session::AdapterSession;
use crate::transport::{TransportCandidate, TransportOpener};

/// Whether a reset response came from a compatible adapter.
///
/// Accepted when the text contains the vendor marker, `OK`, the prompt
/// character, or an echo of the reset command.
pub fn is_adapter_signature(response: &str, reset_command: &str) -> bool {
    let upper = response.to_ascii_uppercase();
    upper.contains(VENDOR_MARKER)
        || upper.contains("OK")
        || upper.contains(PROMPT)
        || upper.contains(&reset_command.to_ascii_uppercase())
}

/// Finds a diagnostic adapter among the available transports
pub struct AdapterDiscovery {
    opener: Arc<dyn TransportOpener>,
    config: DiscoveryConfig,
    channel: ChannelConfig,
}

impl AdapterDiscovery {
    pub fn new(
        opener: Arc<dyn TransportOpener>,
        config: DiscoveryConfig,
        channel: ChannelConfig,
    ) -> Self {
        Self {
            opener,
            config,
            channel,
        }
    }

    /// Candidates in probe order
    pub async fn candidates(&self) -> Result<Vec<TransportCandidate>, DiscoveryError> {
        let ports = if self.config.ports.is_empty() {
            self.opener
                .list_ports()
                .await
                .map_err(DiscoveryError::Enumeration)?
        } else {
            self.config.ports.clone()
        };

        Ok(ports
            .iter()
            .flat_map(|port| {
                self.config
                    .baud_rates
                    .iter()
                    .map(move |&baud| TransportCandidate::new(port.clone(), baud))
            })
            .collect())
    }

    /// Probe candidates until one answers like an adapter.
    ///
    /// The returned session's channel reports errors to `errors`. Probe
    /// failures do not count as session errors.
    pub async fn discover(
        &self,
        errors: Arc<ErrorCounter>,
    ) -> Result<AdapterSession, DiscoveryError> {
        let candidates = self.candidates().await?;
        info!(count = candidates.len(), "Probing for diagnostic adapter");

        for candidate in &candidates {
            if let Some(session) = self.probe(candidate, errors.clone()).await {
                return Ok(session);
            }
        }

        warn!(candidates = candidates.len(), "No diagnostic adapter found");
        Err(DiscoveryError::NotFound {
            candidates: candidates.len(),
        })
    }

    async fn probe(
        &self,
        candidate: &TransportCandidate,
        errors: Arc<ErrorCounter>,
    ) -> Option<AdapterSession> {
        let transport = match self.opener.open(candidate).await {
            Ok(t) => t,
            Err(e) => {
                debug!(%candidate, error = %e, "Candidate unavailable");
                return None;
            }
        };

        tokio::time::sleep(Duration::from_millis(self.config.settle_ms)).await;

        let mut channel = ProtocolChannel::new(
            transport,
            self.channel.clone(),
            Arc::new(ErrorCounter::new()),
        );

        match channel.send(command::RESET).await {
            Ok(response)
                if response.is_success()
                    && is_adapter_signature(&response.text, command::RESET) =>
            {
                info!(%candidate, banner = %response.body(), "Diagnostic adapter found");
                let channel = channel.with_errors(errors);
                Some(AdapterSession::new(channel, response.body()))
            }
            Ok(response) => {
                debug!(%candidate, text = ?response.text, "No adapter signature");
                channel.close().await;
                None
            }
            Err(e) => {
                debug!(%candidate, error = %e, "Candidate did not answer");
                channel.close().await;
                None
            }
        }
    }
}
