//! Decoders for adapter and OBD-II responses
//!
//! All decoders take the text of a successful [`Response`] and return
//! `None` when the payload is missing or implausible. Callers decide on
//! fallbacks.

use std::sync::OnceLock;

use fieldlink_core::Vin;
use regex::Regex;

use crate::protocol::Response;

/// Plausible range for a 12 V vehicle system, inclusive
pub const VOLTAGE_MIN: f64 = 8.0;
pub const VOLTAGE_MAX: f64 = 16.0;

fn vin_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // Mode 09 PID 02 answer, optional record count, then 17 ASCII bytes
    PATTERN.get_or_init(|| {
        Regex::new(r"4902(?:0[1-5])?((?:[0-9A-F]{2}){17})").expect("valid VIN pattern")
    })
}

fn voltage_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\s*(\d{1,2}(?:\.\d+)?)\s*V?\s*$").expect("valid voltage pattern")
    })
}

/// Positive service 01 answer for one PID followed by its data bytes
fn pid_regex(service_pid: &str, data_bytes: usize) -> Regex {
    Regex::new(&format!("{}((?:[0-9A-F]{{2}}){{{}}})", service_pid, data_bytes))
        .expect("valid PID pattern")
}

fn module_voltage_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| pid_regex("4142", 2))
}

fn engine_speed_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| pid_regex("410C", 2))
}

fn supported_pids_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| pid_regex("4100", 4))
}

fn pid_payload(response: &Response, pattern: &Regex) -> Option<Vec<u8>> {
    let hex_text = response.compact_hex();
    let captures = pattern.captures(&hex_text)?;
    hex::decode(captures.get(1)?.as_str()).ok()
}

fn round_tenths(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn plausible_voltage(value: f64) -> Option<f64> {
    (VOLTAGE_MIN..=VOLTAGE_MAX)
        .contains(&value)
        .then(|| round_tenths(value))
}

/// Decode a vehicle identification number from a `0902` response.
///
/// Handles a single-frame answer, with or without a CAN header in front,
/// and the headers-off multi-frame form (`0:`/`1:` line framing). With
/// headers on, a multi-frame answer has a header inside the payload and
/// does not decode; callers retry with headers off.
pub fn parse_vin(response: &Response) -> Option<Vin> {
    let hex_text = response.compact_hex();
    let captures = vin_pattern().captures(&hex_text)?;
    let bytes = hex::decode(captures.get(1)?.as_str()).ok()?;
    let text = String::from_utf8(bytes).ok()?;
    Vin::parse(&text).ok()
}

/// Decode the adapter's own voltage report (`ATRV`), e.g. `12.6V`
pub fn parse_voltage_report(response: &Response) -> Option<f64> {
    let body = response.body();
    body.lines()
        .find_map(|line| voltage_pattern().captures(line))
        .and_then(|c| c.get(1)?.as_str().parse::<f64>().ok())
        .and_then(plausible_voltage)
}

/// Decode control module voltage (PID 0x42): `(256A + B) / 1000` volts
pub fn parse_module_voltage(response: &Response) -> Option<f64> {
    let data = pid_payload(response, module_voltage_pattern())?;
    let millivolts = u16::from_be_bytes([data[0], data[1]]);
    plausible_voltage(f64::from(millivolts) / 1000.0)
}

/// Decode engine speed (PID 0x0C): `(256A + B) / 4` rpm
pub fn parse_engine_speed(response: &Response) -> Option<u32> {
    let data = pid_payload(response, engine_speed_pattern())?;
    Some(u32::from(u16::from_be_bytes([data[0], data[1]])) / 4)
}

/// PIDs 0x01-0x20 a vehicle reports as supported (service 01, PID 0x00)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupportedPids(u32);

impl SupportedPids {
    pub fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Whether `pid` is supported.
    ///
    /// PIDs beyond this bitmask's range are reported as supported; only an
    /// explicit zero bit rules a PID out.
    pub fn supports(&self, pid: u8) -> bool {
        match pid {
            0x01..=0x20 => self.0 & (1 << (0x20 - u32::from(pid))) != 0,
            _ => true,
        }
    }

    pub fn bits(&self) -> u32 {
        self.0
    }
}

/// Decode the supported-PID bitmask from a `0100` response
pub fn parse_supported_pids(response: &Response) -> Option<SupportedPids> {
    let data = pid_payload(response, supported_pids_pattern())?;
    Some(SupportedPids(u32::from_be_bytes([
        data[0], data[1], data[2], data[3],
    ])))
}

/// Protocol name from an `ATDP` response, without the `AUTO, ` prefix
pub fn parse_protocol_name(response: &Response) -> Option<String> {
    let body = response.body();
    let line = body.lines().map(str::trim).find(|l| !l.is_empty())?;
    let name = line.strip_prefix("AUTO,").unwrap_or(line).trim();
    (!name.is_empty()).then(|| name.to_string())
}
