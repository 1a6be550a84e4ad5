//! fieldlink-tunnel - Supervisor for an external private-network tunnel
//!
//! The tunnel itself is provided by an external client binary. This crate
//! starts that client (or notices a tunnel that is already up), detects
//! the virtual interface it creates, measures link latency and reconnects
//! with a bounded policy when the link drops.
//!
//! Process launching, interface detection and reachability probing sit
//! behind traits ([`ProcessLauncher`], [`InterfaceProbe`],
//! [`ReachabilityProbe`]) so the supervisor runs unchanged against test
//! doubles.

pub mod artifact;
pub mod config;
pub mod error;
pub mod interface;
pub mod latency;
pub mod process;
pub mod reconnect;
pub mod supervisor;

pub use artifact::{ensure_artifact, ArtifactStatus};
pub use config::{FallbackPolicy, ReconnectConfig, TunnelConfig};
pub use error::{TunnelError, TunnelResult};
pub use interface::{InterfaceProbe, SystemInterfaceProbe, TunnelInterface};
pub use latency::{measure_latency, ReachabilityProbe, TcpReachability};
pub use process::{ClientLauncher, ManagedProcess, ProcessLauncher, ProcessState};
pub use reconnect::ReconnectCounter;
pub use supervisor::TunnelSupervisor;

// Re-export for convenience
pub use fieldlink_core::{TunnelConnectionState, TunnelEvent, TunnelMode, TunnelStatus};
