//! fieldlink-obd - Vehicle link over ELM327-style diagnostic adapters
//!
//! Discovers a serial diagnostic adapter, talks its line-based protocol and
//! turns the answers into vehicle samples. When no adapter answers, the
//! engine switches to a simulated vehicle so the rest of the agent keeps
//! working.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    VehicleLinkEngine                        │
//! │  connect / poll / disconnect, error threshold, events       │
//! │                                                             │
//! │            ┌──────────────┴──────────────┐                  │
//! │     ┌──────┴────────┐            ┌───────┴───────┐          │
//! │     │HardwareSource │            │SimulatedSource│          │
//! │     │(VIN, V, rpm)  │            │(random walk)  │          │
//! │     └──────┬────────┘            └───────────────┘          │
//! │     ┌──────┴────────┐                                       │
//! │     │AdapterSession │ <── AdapterDiscovery (port x baud)    │
//! │     └──────┬────────┘                                       │
//! │     ┌──────┴────────┐                                       │
//! │     │ProtocolChannel│  classify() on accumulated responses  │
//! │     └──────┬────────┘                                       │
//! │     ┌──────┴────────┐                                       │
//! │     │ ByteTransport │  (serial / mock)                      │
//! │     └───────────────┘                                       │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod parse;
pub mod protocol;
pub mod session;
pub mod source;
pub mod transport;

pub use config::{
    ChannelConfig, DiscoveryConfig, MockConfig, ObdConfig, SimulationConfig, TransportConfig,
};
pub use discovery::{is_adapter_signature, AdapterDiscovery};
pub use engine::VehicleLinkEngine;
pub use error::{DiscoveryError, LinkError, LinkResult};
pub use protocol::{
    classify, ChannelError, ErrorCounter, ProtocolChannel, Response, ResponseKind,
};
pub use session::AdapterSession;
pub use source::{HardwareSource, SimulatedSource, VehicleDataSource, VehicleSource};
pub use transport::{
    create_opener, ByteTransport, TransportCandidate, TransportError, TransportOpener,
};

// Re-export for convenience
pub use fieldlink_core::{LinkMode, LinkState, VehicleEvent, VehicleIdentity, VehicleSample, Vin};
