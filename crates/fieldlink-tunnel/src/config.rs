//! Tunnel supervisor configuration

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the tunnel supervisor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelConfig {
    /// Client configuration artifact; a template is written when missing
    #[serde(default = "default_config_path")]
    pub config_path: PathBuf,
    /// Tunnel client executable, looked up on `PATH` unless absolute
    #[serde(default = "default_client_binary")]
    pub client_binary: String,
    /// Data cipher passed to the client
    #[serde(default = "default_cipher")]
    pub cipher: String,
    /// Client log verbosity
    #[serde(default = "default_verbosity")]
    pub verbosity: u8,
    /// Local management port of the client (graceful stop)
    #[serde(default = "default_management_port")]
    pub management_port: u16,
    /// How long to wait for the tunnel interface after launching the client
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// How long a graceful stop may take before the client is killed
    #[serde(default = "default_graceful_stop")]
    pub graceful_stop_secs: u64,
    /// When to fall back to a simulated link
    #[serde(default)]
    pub fallback: FallbackPolicy,
    /// Interface name fragments identifying a tunnel adapter
    #[serde(default = "default_interface_keywords")]
    pub interface_keywords: Vec<String>,
    /// `host:port` endpoints used for latency probes
    #[serde(default = "default_latency_endpoints")]
    pub latency_endpoints: Vec<String>,
    /// Timeout of a single latency probe
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_ms: u64,
    /// Automatic reconnect policy
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    /// Never start a client; always report a simulated link
    #[serde(default)]
    pub simulate: bool,
}

impl TunnelConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn graceful_stop(&self) -> Duration {
        Duration::from_secs(self.graceful_stop_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            config_path: default_config_path(),
            client_binary: default_client_binary(),
            cipher: default_cipher(),
            verbosity: default_verbosity(),
            management_port: default_management_port(),
            connect_timeout_secs: default_connect_timeout(),
            graceful_stop_secs: default_graceful_stop(),
            fallback: FallbackPolicy::default(),
            interface_keywords: default_interface_keywords(),
            latency_endpoints: default_latency_endpoints(),
            probe_timeout_ms: default_probe_timeout(),
            reconnect: ReconnectConfig::default(),
            simulate: false,
        }
    }
}

fn default_config_path() -> PathBuf {
    PathBuf::from("fieldlink.ovpn")
}

fn default_client_binary() -> String {
    "openvpn".to_string()
}

fn default_cipher() -> String {
    "AES-256-GCM".to_string()
}

fn default_verbosity() -> u8 {
    3
}

fn default_management_port() -> u16 {
    7505
}

fn default_connect_timeout() -> u64 {
    20
}

fn default_graceful_stop() -> u64 {
    5
}

fn default_interface_keywords() -> Vec<String> {
    ["tap", "tun", "openvpn", "wintun", "utun"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_latency_endpoints() -> Vec<String> {
    ["8.8.8.8:53", "1.1.1.1:53", "9.9.9.9:53"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_probe_timeout() -> u64 {
    1000
}

/// When the supervisor reports a simulated link instead of failing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FallbackPolicy {
    /// Never simulate; report the failure
    Never,
    /// Simulate when no client can be started (missing binary or the
    /// artifact is still the template)
    #[default]
    ClientUnavailable,
    /// Also simulate when a started client fails to bring the link up
    Always,
}

// =============================================================================
// Reconnect Policy
// =============================================================================

/// Automatic reconnect policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Attempts before giving up until an explicit connect
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before every attempt
    #[serde(default = "default_delay")]
    pub delay_secs: u64,
}

impl ReconnectConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_secs: default_delay(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_delay() -> u64 {
    5
}
