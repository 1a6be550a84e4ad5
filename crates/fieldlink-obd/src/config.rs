//! Vehicle link configuration
//!
//! Every field has a default so an empty `[obd]` table yields a working
//! engine that enumerates system serial ports.

use serde::{Deserialize, Serialize};

/// Configuration for the vehicle link engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObdConfig {
    /// Consecutive communication errors after which the session is closed
    #[serde(default = "default_error_threshold")]
    pub error_threshold: u32,
    /// Protocol channel timing
    #[serde(default)]
    pub channel: ChannelConfig,
    /// Adapter discovery candidates and timing
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    /// Simulated data source parameters
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Transport backend
    #[serde(default)]
    pub transport: TransportConfig,
}

impl Default for ObdConfig {
    fn default() -> Self {
        Self {
            error_threshold: default_error_threshold(),
            channel: ChannelConfig::default(),
            discovery: DiscoveryConfig::default(),
            simulation: SimulationConfig::default(),
            transport: TransportConfig::default(),
        }
    }
}

fn default_error_threshold() -> u32 {
    5
}

// =============================================================================
// Protocol Channel
// =============================================================================

/// Request/response timing for the protocol channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Total time to wait for a response terminator
    #[serde(default = "default_response_timeout")]
    pub response_timeout_ms: u64,
    /// Read polling granularity
    #[serde(default = "default_poll_granularity")]
    pub poll_granularity_ms: u64,
}

impl ChannelConfig {
    /// Number of read polls before a command times out
    pub fn max_polls(&self) -> u64 {
        let granularity = self.poll_granularity_ms.max(1);
        self.response_timeout_ms.div_ceil(granularity).max(1)
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            response_timeout_ms: default_response_timeout(),
            poll_granularity_ms: default_poll_granularity(),
        }
    }
}

fn default_response_timeout() -> u64 {
    3000
}

fn default_poll_granularity() -> u64 {
    100
}

// =============================================================================
// Adapter Discovery
// =============================================================================

/// Candidate enumeration for adapter discovery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Explicit port list; empty means enumerate the system's ports
    #[serde(default)]
    pub ports: Vec<String>,
    /// Bit-rates tried, in order, on every port
    #[serde(default = "default_baud_rates")]
    pub baud_rates: Vec<u32>,
    /// Delay between opening a port and sending the reset command
    #[serde(default = "default_settle")]
    pub settle_ms: u64,
    /// Serial read/write timeout
    #[serde(default = "default_io_timeout")]
    pub io_timeout_ms: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            ports: Vec::new(),
            baud_rates: default_baud_rates(),
            settle_ms: default_settle(),
            io_timeout_ms: default_io_timeout(),
        }
    }
}

fn default_baud_rates() -> Vec<u32> {
    vec![38400, 9600, 115200, 57600]
}

fn default_settle() -> u64 {
    200
}

fn default_io_timeout() -> u64 {
    200
}

// =============================================================================
// Simulation
// =============================================================================

/// Parameters of the simulated data source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Maximum change of the simulated voltage between two reads (volts)
    #[serde(default = "default_voltage_step")]
    pub voltage_step: f64,
    /// Probability that the simulated ignition reads as on
    #[serde(default = "default_ignition_probability")]
    pub ignition_on_probability: f64,
    /// Fixed RNG seed for a reproducible sequence
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            voltage_step: default_voltage_step(),
            ignition_on_probability: default_ignition_probability(),
            seed: None,
        }
    }
}

fn default_voltage_step() -> f64 {
    0.3
}

fn default_ignition_probability() -> f64 {
    0.85
}

// =============================================================================
// Transport Configuration
// =============================================================================

/// Transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    /// Serial ports (USB/Bluetooth SPP adapters)
    Serial,
    /// Built-in emulated adapter for demos and tests
    Mock(MockConfig),
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::Serial
    }
}

/// Mock transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockConfig {
    /// Name of the emulated port
    #[serde(default = "default_mock_port")]
    pub port: String,
    /// Bit-rate at which the emulated adapter answers
    #[serde(default = "default_mock_baud")]
    pub baud_rate: u32,
    /// Simulated response latency in milliseconds
    #[serde(default)]
    pub latency_ms: u64,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            port: default_mock_port(),
            baud_rate: default_mock_baud(),
            latency_ms: 0,
        }
    }
}

fn default_mock_port() -> String {
    "mock0".to_string()
}

fn default_mock_baud() -> u32 {
    38400
}
