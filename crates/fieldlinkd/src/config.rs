//! TOML configuration for the agent
//!
//! Every field has a default, so an empty file (or none at all) gives a
//! runnable agent that falls back to simulated hardware.

use std::path::Path;
use std::time::Duration;

use anyhow::{ensure, Context};
use fieldlink_client::CollectorConfig;
use fieldlink_obd::{MockConfig, ObdConfig, TransportConfig};
use fieldlink_tunnel::TunnelConfig;
use serde::Deserialize;

/// Top-level agent configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Identifies this unit to the collector
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// Vehicle link poll timer
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Tunnel status check timer
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,
    #[serde(default)]
    pub collector: CollectorConfig,
    #[serde(default)]
    pub emitter: EmitterConfig,
    #[serde(default)]
    pub obd: ObdConfig,
    #[serde(default)]
    pub tunnel: TunnelConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            client_id: default_client_id(),
            poll_interval_ms: default_poll_interval(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            collector: CollectorConfig::default(),
            emitter: EmitterConfig::default(),
            obd: ObdConfig::default(),
            tunnel: TunnelConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file '{}'", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config file '{}'", path.display()))?;
        Ok(config)
    }

    /// Reject timer intervals of zero
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.poll_interval_ms > 0, "poll_interval_ms must be greater than 0");
        ensure!(
            self.heartbeat_interval_secs > 0,
            "heartbeat_interval_secs must be greater than 0"
        );
        ensure!(
            self.emitter.tick_interval_ms > 0,
            "emitter.tick_interval_ms must be greater than 0"
        );
        Ok(())
    }

    /// Use the emulated adapter and a simulated tunnel
    pub fn force_simulation(&mut self) {
        self.obd.transport = TransportConfig::Mock(MockConfig::default());
        // Configured ports belong to the serial transport
        self.obd.discovery.ports.clear();
        self.tunnel.simulate = true;
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}

fn default_client_id() -> String {
    "field-unit-01".to_string()
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_heartbeat_interval() -> u64 {
    5
}

// =============================================================================
// Emitter
// =============================================================================

/// Telemetry emitter timing
#[derive(Debug, Clone, Deserialize)]
pub struct EmitterConfig {
    /// Emitter timer, independent of the engines' timers
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
    /// Minimum time between two successful sends
    #[serde(default = "default_min_send_interval")]
    pub min_send_interval_ms: u64,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval(),
            min_send_interval_ms: default_min_send_interval(),
        }
    }
}

impl EmitterConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn min_send_interval(&self) -> Duration {
        Duration::from_millis(self.min_send_interval_ms)
    }
}

fn default_tick_interval() -> u64 {
    1000
}

fn default_min_send_interval() -> u64 {
    2500
}
