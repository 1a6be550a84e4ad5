//! Vehicle data sources
//!
//! A source is chosen once when the link connects: the hardware source
//! when an adapter was discovered, the simulated source otherwise. The two
//! are never mixed within one session.

mod hardware;
mod simulated;

pub use hardware::HardwareSource;
pub use simulated::{SimulatedSource, SIMULATED_IDENTITIES};

use async_trait::async_trait;
use fieldlink_core::{LinkMode, VehicleIdentity};

/// Readings every vehicle data source provides
#[async_trait]
pub trait VehicleDataSource: Send {
    fn mode(&self) -> LinkMode;

    /// Vehicle protocol reported to the collector
    fn protocol_name(&self) -> &str;

    async fn read_identity(&mut self) -> VehicleIdentity;

    /// Battery voltage in volts, one decimal place
    async fn read_voltage(&mut self) -> Option<f64>;

    async fn read_engine_speed(&mut self) -> Option<u32>;

    async fn is_ignition_on(&mut self) -> Option<bool>;

    /// Ignition and engine speed in one pass
    async fn read_ignition_and_speed(&mut self) -> (Option<bool>, Option<u32>) {
        let ignition = self.is_ignition_on().await;
        let speed = self.read_engine_speed().await;
        (ignition, speed)
    }

    async fn close(&mut self);
}

/// The source backing an active link
pub enum VehicleSource {
    Hardware(HardwareSource),
    Simulated(SimulatedSource),
}

#[async_trait]
impl VehicleDataSource for VehicleSource {
    fn mode(&self) -> LinkMode {
        match self {
            Self::Hardware(s) => s.mode(),
            Self::Simulated(s) => s.mode(),
        }
    }

    fn protocol_name(&self) -> &str {
        match self {
            Self::Hardware(s) => s.protocol_name(),
            Self::Simulated(s) => s.protocol_name(),
        }
    }

    async fn read_identity(&mut self) -> VehicleIdentity {
        match self {
            Self::Hardware(s) => s.read_identity().await,
            Self::Simulated(s) => s.read_identity().await,
        }
    }

    async fn read_voltage(&mut self) -> Option<f64> {
        match self {
            Self::Hardware(s) => s.read_voltage().await,
            Self::Simulated(s) => s.read_voltage().await,
        }
    }

    async fn read_engine_speed(&mut self) -> Option<u32> {
        match self {
            Self::Hardware(s) => s.read_engine_speed().await,
            Self::Simulated(s) => s.read_engine_speed().await,
        }
    }

    async fn is_ignition_on(&mut self) -> Option<bool> {
        match self {
            Self::Hardware(s) => s.is_ignition_on().await,
            Self::Simulated(s) => s.is_ignition_on().await,
        }
    }

    async fn read_ignition_and_speed(&mut self) -> (Option<bool>, Option<u32>) {
        match self {
            Self::Hardware(s) => s.read_ignition_and_speed().await,
            Self::Simulated(s) => s.read_ignition_and_speed().await,
        }
    }

    async fn close(&mut self) {
        match self {
            Self::Hardware(s) => s.close().await,
            Self::Simulated(s) => s.close().await,
        }
    }
}
