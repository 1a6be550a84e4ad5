//! Tunnel connection state and status snapshots

use std::net::Ipv4Addr;

use serde::Serialize;

/// Latency value reported when no probe succeeded
pub const LATENCY_UNAVAILABLE: f64 = -1.0;

/// Tunnel supervisor state. Only supervisor transitions write it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TunnelConnectionState {
    #[default]
    Idle,
    Connecting,
    Connected,
    /// Link was up and has been lost, or is up without reachability
    Degraded,
    Reconnecting,
    Disconnected,
}

/// How the current tunnel link came about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TunnelMode {
    /// A client process started and owned by the supervisor
    Managed,
    /// A tunnel that was already up when the supervisor looked
    External,
    /// No real client available; synthetic link
    Simulated,
}

/// Snapshot of the tunnel link, recomputed on every status check
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TunnelStatus {
    pub connected: bool,
    pub local_address: Option<Ipv4Addr>,
    pub interface: Option<String>,
    /// Average round-trip time in milliseconds, or [`LATENCY_UNAVAILABLE`]
    pub latency_ms: f64,
    pub mode: Option<TunnelMode>,
    pub error: Option<String>,
}

impl TunnelStatus {
    pub fn connected(
        mode: TunnelMode,
        interface: Option<String>,
        local_address: Ipv4Addr,
        latency_ms: f64,
    ) -> Self {
        Self {
            connected: true,
            local_address: Some(local_address),
            interface,
            latency_ms,
            mode: Some(mode),
            error: None,
        }
    }

    pub fn disconnected(error: Option<String>) -> Self {
        Self {
            connected: false,
            local_address: None,
            interface: None,
            latency_ms: LATENCY_UNAVAILABLE,
            mode: None,
            error,
        }
    }

    pub fn has_latency(&self) -> bool {
        self.latency_ms >= 0.0
    }
}

impl Default for TunnelStatus {
    fn default() -> Self {
        Self::disconnected(None)
    }
}

/// Events published by the tunnel supervisor
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TunnelEvent {
    StateChanged {
        from: TunnelConnectionState,
        to: TunnelConnectionState,
    },
    Status(TunnelStatus),
    ReconnectAttempt { attempt: u32, max_attempts: u32 },
    /// Reconnect cap reached; automatic reconnects stop until an explicit connect
    ReconnectExhausted { attempts: u32 },
}
