//! ELM327-style command/response protocol
//!
//! Responses are free text terminated by a `>` prompt. Instead of ad hoc
//! substring checks at every call site, the accumulated buffer is run
//! through [`classify`], which recognises the terminators and error markers
//! the adapter emits.

mod channel;

pub use channel::{ChannelError, ErrorCounter, ProtocolChannel};

use std::fmt;

/// Adapter commands
pub mod command {
    /// Full reset; answers with the adapter's identification banner
    pub const RESET: &str = "ATZ";
    pub const ECHO_OFF: &str = "ATE0";
    pub const LINEFEEDS_OFF: &str = "ATL0";
    pub const SPACES_OFF: &str = "ATS0";
    pub const HEADERS_ON: &str = "ATH1";
    pub const HEADERS_OFF: &str = "ATH0";
    /// Describe the active vehicle protocol
    pub const DESCRIBE_PROTOCOL: &str = "ATDP";
    /// Adapter's own supply-voltage reading (e.g. `12.6V`)
    pub const READ_VOLTAGE: &str = "ATRV";
    /// Mode 01 PID 00: supported PIDs 01-20
    pub const SUPPORTED_PIDS: &str = "0100";
    /// Mode 01 PID 0C: engine speed
    pub const ENGINE_SPEED: &str = "010C";
    /// Mode 01 PID 42: control module voltage
    pub const MODULE_VOLTAGE: &str = "0142";
    /// Mode 09 PID 02: vehicle identification number
    pub const VEHICLE_ID: &str = "0902";
}

/// Mode 01 PIDs referenced by the engine
pub mod pid {
    pub const ENGINE_SPEED: u8 = 0x0C;
    pub const MODULE_VOLTAGE: u8 = 0x42;
}

/// Prompt character ending every adapter response
pub const PROMPT: char = '>';

/// Vendor marker found in the reset banner of compatible adapters
pub const VENDOR_MARKER: &str = "ELM327";

/// Error markers, checked before the generic terminators
const ERROR_MARKERS: &[&str] = &[
    "UNABLE TO CONNECT",
    "CAN ERROR",
    "BUS ERROR",
    "BUS BUSY",
    "BUFFER FULL",
    "STOPPED",
    "ERROR",
    "?",
];

const NO_DATA: &str = "NO DATA";
const OK: &str = "OK";

/// Outcome of one request/response exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseKind {
    /// Prompt or `OK` seen without an error marker
    Success,
    /// Vehicle answered nothing for the request
    NoData,
    /// Adapter reported an error; carries the marker that matched
    Error(&'static str),
    /// No terminator within the polling budget
    Timeout,
}

impl fmt::Display for ResponseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str("success"),
            Self::NoData => f.write_str("no data"),
            Self::Error(marker) => write!(f, "error ({})", marker),
            Self::Timeout => f.write_str("timeout"),
        }
    }
}

/// Classify an accumulated response buffer.
///
/// Returns `None` while no terminator is present yet. `Timeout` is never
/// returned here; the channel produces it when its polling budget runs out.
pub fn classify(buffer: &str) -> Option<ResponseKind> {
    let upper = buffer.to_ascii_uppercase();

    if upper.contains(NO_DATA) {
        return Some(ResponseKind::NoData);
    }
    if let Some(marker) = ERROR_MARKERS.iter().find(|m| upper.contains(*m)) {
        // Error text can arrive before the prompt; wait for a terminator
        // unless the marker is a complete adapter message on its own.
        if upper.contains(PROMPT) || *marker != "?" {
            return Some(ResponseKind::Error(marker));
        }
    }
    if upper.contains(PROMPT) || upper.contains(OK) {
        return Some(ResponseKind::Success);
    }
    None
}

/// A classified response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub kind: ResponseKind,
    /// Accumulated text, trimmed of surrounding whitespace
    pub text: String,
}

impl Response {
    pub fn is_success(&self) -> bool {
        self.kind == ResponseKind::Success
    }

    /// Text without the prompt, carriage returns folded to newlines
    pub fn body(&self) -> String {
        self.text
            .trim_end_matches(PROMPT)
            .replace('\r', "\n")
            .trim()
            .to_string()
    }

    /// Hex digits only, whitespace and line-index prefixes (`0:`) removed.
    ///
    /// ELM327 frames multi-line answers as `0:...`, `1:...`; the index and
    /// colon are framing, not payload.
    pub fn compact_hex(&self) -> String {
        self.body()
            .lines()
            .map(|line| match line.split_once(':') {
                Some((_, rest)) => rest,
                None => line,
            })
            .flat_map(|line| line.chars())
            .filter(|c| c.is_ascii_hexdigit())
            .map(|c| c.to_ascii_uppercase())
            .collect()
    }
}
