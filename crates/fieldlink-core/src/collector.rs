//! CollectorApi trait - the remote side that persists telemetry
//!
//! The agent never retries collector calls synchronously. Failures are
//! logged by the caller and the next sample simply tries again.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CollectorResult;
use crate::models::VehicleSample;

/// Collector-assigned session identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Payload of a `createSample` call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleRecord {
    pub session_id: SessionId,
    pub voltage: Option<f64>,
    pub ignition_state: Option<bool>,
    pub engine_speed: Option<u32>,
    pub raw_debug_string: String,
}

impl SampleRecord {
    pub fn from_sample(session_id: SessionId, sample: &VehicleSample) -> Self {
        Self {
            session_id,
            voltage: sample.battery_voltage,
            ignition_state: sample.ignition_on,
            engine_speed: sample.engine_speed_rpm,
            raw_debug_string: sample.raw_debug(),
        }
    }
}

/// Remote collector that receives sessions and samples
#[async_trait]
pub trait CollectorApi: Send + Sync {
    /// Open a telemetry session for a connected vehicle link
    async fn create_session(
        &self,
        client_id: &str,
        adapter_type: &str,
        protocol_name: &str,
    ) -> CollectorResult<SessionId>;

    /// Submit one sample
    async fn create_sample(&self, record: &SampleRecord) -> CollectorResult<()>;

    /// Close a session
    async fn end_session(&self, session_id: &SessionId) -> CollectorResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LinkMode, VehicleIdentity};
    use chrono::Utc;

    #[test]
    fn test_sample_record_from_sample() {
        let sample = VehicleSample {
            identity: VehicleIdentity::ReadFailed,
            battery_voltage: Some(12.4),
            ignition_on: Some(true),
            engine_speed_rpm: Some(812),
            mode: LinkMode::Simulated,
            sampled_at: Utc::now(),
        };
        let record = SampleRecord::from_sample(SessionId("s-1".into()), &sample);

        assert_eq!(record.voltage, Some(12.4));
        assert_eq!(record.ignition_state, Some(true));
        assert_eq!(record.engine_speed, Some(812));
        assert!(record.raw_debug_string.contains("mode=Simulated"));

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["sessionId"], "s-1");
        assert_eq!(json["engineSpeed"], 812);
    }
}
