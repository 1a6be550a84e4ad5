//! Readings from a physical adapter

use async_trait::async_trait;
use fieldlink_core::{LinkMode, VehicleIdentity, Vin};
use tracing::{debug, warn};

use super::VehicleDataSource;
use crate::parse::{parse_engine_speed, parse_module_voltage, parse_vin, parse_voltage_report};
use crate::protocol::{command, pid, ChannelError, Response, ResponseKind};
use crate::session::AdapterSession;

/// Vehicle data read through an initialized [`AdapterSession`]
pub struct HardwareSource {
    session: AdapterSession,
}

impl HardwareSource {
    pub fn new(session: AdapterSession) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &AdapterSession {
        &self.session
    }

    /// Send a command, keeping only successful responses
    async fn query(&mut self, cmd: &str) -> Result<Option<Response>, ChannelError> {
        let response = self.session.channel().send(cmd).await?;
        if response.is_success() {
            Ok(Some(response))
        } else {
            debug!(command = %cmd, kind = %response.kind, "Query not answered");
            Ok(None)
        }
    }

    async fn query_logged(&mut self, cmd: &str) -> Option<Response> {
        match self.query(cmd).await {
            Ok(response) => response,
            Err(e) => {
                warn!(command = %cmd, error = %e, "Query failed");
                None
            }
        }
    }

    /// VIN with headers off, for adapters whose framing splits the payload
    async fn read_vin_headerless(&mut self) -> Option<Vin> {
        self.query_logged(command::HEADERS_OFF).await?;
        let vin = self
            .query_logged(command::VEHICLE_ID)
            .await
            .and_then(|r| parse_vin(&r));
        if self.query_logged(command::HEADERS_ON).await.is_none() {
            debug!("Could not restore headers after VIN read");
        }
        vin
    }
}

#[async_trait]
impl VehicleDataSource for HardwareSource {
    fn mode(&self) -> LinkMode {
        LinkMode::Hardware
    }

    fn protocol_name(&self) -> &str {
        self.session.protocol_name()
    }

    async fn read_identity(&mut self) -> VehicleIdentity {
        if let Some(vin) = self
            .query_logged(command::VEHICLE_ID)
            .await
            .and_then(|r| parse_vin(&r))
        {
            return VehicleIdentity::Known(vin);
        }

        match self.read_vin_headerless().await {
            Some(vin) => VehicleIdentity::Known(vin),
            None => {
                debug!("VIN unavailable");
                VehicleIdentity::ReadFailed
            }
        }
    }

    async fn read_voltage(&mut self) -> Option<f64> {
        if let Some(response) = self.query_logged(command::READ_VOLTAGE).await {
            match parse_voltage_report(&response) {
                Some(volts) => return Some(volts),
                None => debug!(text = ?response.text, "Implausible adapter voltage report"),
            }
        }

        if !self.session.supports(pid::MODULE_VOLTAGE) {
            return None;
        }
        self.query_logged(command::MODULE_VOLTAGE)
            .await
            .and_then(|r| parse_module_voltage(&r))
    }

    async fn read_engine_speed(&mut self) -> Option<u32> {
        if !self.session.supports(pid::ENGINE_SPEED) {
            return None;
        }
        self.query_logged(command::ENGINE_SPEED)
            .await
            .and_then(|r| parse_engine_speed(&r))
    }

    async fn is_ignition_on(&mut self) -> Option<bool> {
        self.read_ignition_and_speed().await.0
    }

    async fn read_ignition_and_speed(&mut self) -> (Option<bool>, Option<u32>) {
        // A decodable engine speed means the ignition is on
        if let Some(rpm) = self.read_engine_speed().await {
            return (Some(true), Some(rpm));
        }

        // Otherwise: can the adapter reach the control unit at all?
        let ignition = match self.session.channel().send(command::SUPPORTED_PIDS).await {
            Ok(response) => Some(
                response.kind == ResponseKind::Success && response.compact_hex().contains("4100"),
            ),
            Err(e) => {
                warn!(error = %e, "Ignition probe failed");
                None
            }
        };
        (ignition, None)
    }

    async fn close(&mut self) {
        self.session.close().await;
    }
}
