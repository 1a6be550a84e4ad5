//! Data model shared by the vehicle link and tunnel engines

mod tunnel;
mod vehicle;

pub use tunnel::{TunnelConnectionState, TunnelEvent, TunnelMode, TunnelStatus, LATENCY_UNAVAILABLE};
pub use vehicle::{
    LinkMode, LinkState, VehicleEvent, VehicleIdentity, VehicleSample, Vin, VinError, VIN_LENGTH,
};
