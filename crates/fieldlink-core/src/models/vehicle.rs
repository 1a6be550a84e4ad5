//! Vehicle identity, samples and link events

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use thiserror::Error;

/// Length of a vehicle identification number
pub const VIN_LENGTH: usize = 17;

/// Validation failures for a VIN
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VinError {
    #[error("VIN must be 17 characters, got {0}")]
    Length(usize),

    #[error("VIN contains invalid character '{0}'")]
    InvalidCharacter(char),
}

/// A validated 17-character vehicle identification number.
///
/// Only ASCII letters and digits are accepted, excluding `I`, `O` and `Q`.
/// Lowercase input is normalised to uppercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Vin(String);

impl Vin {
    pub fn parse(value: &str) -> Result<Self, VinError> {
        let count = value.chars().count();
        if count != VIN_LENGTH {
            return Err(VinError::Length(count));
        }
        let normalized = value.to_ascii_uppercase();
        if let Some(bad) = normalized
            .chars()
            .find(|c| !c.is_ascii_alphanumeric() || matches!(c, 'I' | 'O' | 'Q'))
        {
            return Err(VinError::InvalidCharacter(bad));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Vin {
    type Err = VinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Vin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for Vin {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// Result of an identity read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VehicleIdentity {
    Known(Vin),
    /// Sentinel for "read failed"; never cached
    ReadFailed,
}

impl VehicleIdentity {
    pub const READ_FAILED: &'static str = "READ_FAILED";

    pub fn is_known(&self) -> bool {
        matches!(self, Self::Known(_))
    }

    pub fn vin(&self) -> Option<&Vin> {
        match self {
            Self::Known(vin) => Some(vin),
            Self::ReadFailed => None,
        }
    }
}

impl Serialize for VehicleIdentity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Known(vin) => vin.serialize(serializer),
            Self::ReadFailed => serializer.serialize_str(Self::READ_FAILED),
        }
    }
}

impl fmt::Display for VehicleIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(vin) => vin.fmt(f),
            Self::ReadFailed => f.write_str(Self::READ_FAILED),
        }
    }
}

/// Which data source backs an active vehicle link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkMode {
    Hardware,
    Simulated,
}

impl LinkMode {
    /// Adapter type reported to the collector when a session starts
    pub fn adapter_type(&self) -> &'static str {
        match self {
            Self::Hardware => "ELM327",
            Self::Simulated => "Simulated",
        }
    }
}

/// Vehicle link engine state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    #[default]
    Disconnected,
    Connecting,
    Hardware,
    Simulated,
}

impl LinkState {
    /// Whether a data source (real or simulated) is active
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Hardware | Self::Simulated)
    }
}

/// One poll of the vehicle. Absent readings are `None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleSample {
    pub identity: VehicleIdentity,
    /// Battery voltage in volts, one decimal place
    pub battery_voltage: Option<f64>,
    pub ignition_on: Option<bool>,
    pub engine_speed_rpm: Option<u32>,
    pub mode: LinkMode,
    pub sampled_at: DateTime<Utc>,
}

impl VehicleSample {
    /// Compact single-line rendering sent alongside samples for debugging
    pub fn raw_debug(&self) -> String {
        fn or_na<T: fmt::Display>(value: Option<T>) -> String {
            value.map_or_else(|| "N/A".to_string(), |v| v.to_string())
        }

        format!(
            "vin={};voltage={};ignition={};rpm={};mode={}",
            self.identity,
            or_na(self.battery_voltage.map(|v| format!("{:.1}", v))),
            or_na(self.ignition_on),
            or_na(self.engine_speed_rpm),
            self.mode.adapter_type(),
        )
    }
}

/// Events published by the vehicle link engine
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VehicleEvent {
    StateChanged { from: LinkState, to: LinkState },
    AdapterDetected {
        port: String,
        baud_rate: u32,
        protocol: String,
    },
    Sample(VehicleSample),
    CommunicationLost { consecutive_errors: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("1HGCM82633A004352")]
    #[case("WVWZZZ1KZ6W612345")]
    #[case("jh4ka7561pc008269")]
    fn test_valid_vins(#[case] input: &str) {
        let vin = Vin::parse(input).unwrap();
        assert_eq!(vin.as_str(), input.to_ascii_uppercase());
    }

    #[rstest]
    #[case("1HGCM82633A00435I", 'I')]
    #[case("1HGCM82633A00435O", 'O')]
    #[case("QHGCM82633A004352", 'Q')]
    #[case("1HGCM82633A00435-", '-')]
    #[case("1HGCM82633A0043 2", ' ')]
    fn test_rejects_invalid_characters(#[case] input: &str, #[case] bad: char) {
        assert_eq!(Vin::parse(input), Err(VinError::InvalidCharacter(bad)));
    }

    #[rstest]
    #[case("", 0)]
    #[case("1HGCM82633A00435", 16)]
    #[case("1HGCM82633A0043521", 18)]
    fn test_rejects_wrong_length(#[case] input: &str, #[case] len: usize) {
        assert_eq!(Vin::parse(input), Err(VinError::Length(len)));
    }

    #[test]
    fn test_every_17_char_string_with_excluded_letter_is_rejected() {
        let base = "1HGCM82633A004352";
        for position in 0..VIN_LENGTH {
            for excluded in ['I', 'O', 'Q', 'i', 'o', 'q'] {
                let mut chars: Vec<char> = base.chars().collect();
                chars[position] = excluded;
                let candidate: String = chars.into_iter().collect();
                assert!(Vin::parse(&candidate).is_err(), "accepted {}", candidate);
            }
        }
    }

    #[test]
    fn test_identity_display() {
        assert_eq!(VehicleIdentity::ReadFailed.to_string(), "READ_FAILED");
        let vin = Vin::parse("1HGCM82633A004352").unwrap();
        assert_eq!(VehicleIdentity::Known(vin).to_string(), "1HGCM82633A004352");
    }

    #[test]
    fn test_raw_debug_marks_missing_values() {
        let sample = VehicleSample {
            identity: VehicleIdentity::ReadFailed,
            battery_voltage: Some(12.6),
            ignition_on: None,
            engine_speed_rpm: None,
            mode: LinkMode::Hardware,
            sampled_at: Utc::now(),
        };
        assert_eq!(
            sample.raw_debug(),
            "vin=READ_FAILED;voltage=12.6;ignition=N/A;rpm=N/A;mode=ELM327"
        );
    }

    #[test]
    fn test_identity_serializes_as_string() {
        let json = serde_json::to_string(&VehicleIdentity::ReadFailed).unwrap();
        assert_eq!(json, "\"READ_FAILED\"");
    }
}
