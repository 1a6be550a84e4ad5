//! fieldlinkd - fieldlink telemetry agent
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                            Agent                             │
//! │                                                              │
//! │  ┌───────────────────┐            ┌───────────────────────┐  │
//! │  │ VehicleLinkEngine │─ samples ─▶│   TelemetryEmitter    │  │
//! │  │   (poll timer)    │            │     (tick timer)      │  │
//! │  └─────────┬─────────┘            └───────────┬───────────┘  │
//! │            │ link events                      │              │
//! │            ▼                                  ▼              │
//! │  ┌───────────────────┐            ┌───────────────────────┐  │
//! │  │  watcher task     │──────────▶ │   CollectorSession    │──┼──▶ collector
//! │  └───────────────────┘            └───────────────────────┘  │
//! │                                                              │
//! │  ┌───────────────────┐                                       │
//! │  │ TunnelSupervisor  │  (heartbeat timer)                    │
//! │  └───────────────────┘                                       │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod agent;
pub mod config;
pub mod emitter;
pub mod session;

pub use agent::Agent;
pub use config::{AgentConfig, EmitterConfig};
pub use emitter::{EmitOutcome, TelemetryEmitter};
pub use session::CollectorSession;
