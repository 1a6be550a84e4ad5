//! An open adapter: protocol channel plus what initialization learned

use tracing::{debug, info, warn};

use crate::parse::{parse_protocol_name, parse_supported_pids, SupportedPids};
use crate::protocol::{command, ProtocolChannel};
use crate::transport::TransportCandidate;

/// Protocol name used when the adapter cannot describe its protocol
pub const UNKNOWN_PROTOCOL: &str = "Unknown";

/// Commands sent after discovery, in order
const SETUP_COMMANDS: &[&str] = &[
    command::ECHO_OFF,
    command::LINEFEEDS_OFF,
    command::SPACES_OFF,
    command::HEADERS_ON,
];

/// A discovered adapter.
///
/// Created by [`AdapterDiscovery`](crate::AdapterDiscovery) with the reset
/// banner; [`initialize`](Self::initialize) configures output formatting and
/// detects the vehicle protocol.
pub struct AdapterSession {
    channel: ProtocolChannel,
    banner: String,
    protocol_name: String,
    supported_pids: Option<SupportedPids>,
}

impl AdapterSession {
    pub fn new(channel: ProtocolChannel, banner: String) -> Self {
        Self {
            channel,
            banner,
            protocol_name: UNKNOWN_PROTOCOL.to_string(),
            supported_pids: None,
        }
    }

    /// Configure the adapter and detect the vehicle protocol.
    ///
    /// Failures are logged and tolerated: an adapter that ignores a setup
    /// command is still usable, and the protocol stays [`UNKNOWN_PROTOCOL`].
    pub async fn initialize(&mut self) {
        for cmd in SETUP_COMMANDS {
            match self.channel.send(cmd).await {
                Ok(response) if response.is_success() => {}
                Ok(response) => {
                    warn!(command = %cmd, kind = %response.kind, "Adapter rejected setup command")
                }
                Err(e) => warn!(command = %cmd, error = %e, "Setup command failed"),
            }
        }

        // Triggers the adapter's automatic protocol search
        match self.channel.send(command::SUPPORTED_PIDS).await {
            Ok(response) if response.is_success() => {
                self.supported_pids = parse_supported_pids(&response);
                debug!(pids = ?self.supported_pids, "Supported PIDs");
            }
            Ok(response) => debug!(kind = %response.kind, "Vehicle did not report supported PIDs"),
            Err(e) => debug!(error = %e, "Supported PID query failed"),
        }

        match self.channel.send(command::DESCRIBE_PROTOCOL).await {
            Ok(response) if response.is_success() => {
                if let Some(name) = parse_protocol_name(&response) {
                    self.protocol_name = name;
                }
            }
            Ok(response) => debug!(kind = %response.kind, "Protocol description rejected"),
            Err(e) => debug!(error = %e, "Protocol description failed"),
        }

        info!(
            candidate = %self.channel.candidate(),
            protocol = %self.protocol_name,
            "Adapter initialized"
        );
    }

    pub fn channel(&mut self) -> &mut ProtocolChannel {
        &mut self.channel
    }

    pub fn candidate(&self) -> &TransportCandidate {
        self.channel.candidate()
    }

    pub fn banner(&self) -> &str {
        &self.banner
    }

    pub fn protocol_name(&self) -> &str {
        &self.protocol_name
    }

    /// Whether the vehicle supports `pid`. Unknown support counts as supported.
    pub fn supports(&self, pid: u8) -> bool {
        self.supported_pids.map_or(true, |pids| pids.supports(pid))
    }

    pub fn is_open(&self) -> bool {
        self.channel.is_open()
    }

    pub async fn close(&mut self) {
        self.channel.close().await;
    }
}
