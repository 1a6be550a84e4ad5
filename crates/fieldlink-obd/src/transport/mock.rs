//! Mock transport emulating an ELM327 adapter
//!
//! Used by tests and by the daemon's `--simulate` mode. Each
//! (port, bit-rate) candidate has a [`MockBehavior`]; answering candidates
//! serve commands from a [`MockResponses`] table with ELM327-like echo and
//! header state.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use super::{ByteTransport, TransportCandidate, TransportError, TransportOpener};
use crate::config::MockConfig;

/// Bytes handed out per read, so callers see responses arrive in pieces
const READ_CHUNK: usize = 16;

/// Response for commands the table does not know
const UNKNOWN_COMMAND: &str = "?\r\r>";

/// Command/response table of an emulated adapter
#[derive(Debug, Clone, Default)]
pub struct MockResponses {
    /// Whether the adapter echoes commands until `ATE0`
    echo: bool,
    /// Responses while headers are on (the adapter default after ATH1)
    entries: Vec<(String, String)>,
    /// Responses that differ while headers are off
    headerless: Vec<(String, String)>,
}

impl MockResponses {
    /// An empty table without echo; every command answers `?`
    pub fn empty() -> Self {
        Self::default()
    }

    /// A healthy ELM327 v1.5 talking to a CAN vehicle with the engine idling
    pub fn elm327() -> Self {
        let ok = "OK\r\r>";
        let mut table = Self {
            echo: true,
            ..Self::empty()
        };
        for cmd in [
            "ATE0", "ATE1", "ATL0", "ATL1", "ATS0", "ATS1", "ATH0", "ATH1", "ATSP0",
        ] {
            table = table.with(cmd, ok);
        }
        table
            .with("ATZ", "\r\rELM327 v1.5\r\r>")
            .with("ATI", "ELM327 v1.5\r\r>")
            .with("ATDP", "AUTO, ISO 15765-4 (CAN 11/500)\r\r>")
            .with("ATDPN", "A6\r\r>")
            .with("ATRV", "12.6V\r\r>")
            // PIDs 01-20 supported: BE3FA813 (includes 0x0C)
            .with("0100", "7E8064100BE3FA813\r\r>")
            // 0x0BB8 / 4 = 750 rpm
            .with("010C", "7E804410C0BB8\r\r>")
            // 0x3138 = 12600 mV
            .with("0142", "7E80441423138\r\r>")
            // Multi-frame VIN with CAN headers interleaved
            .with(
                "0902",
                "7E81014490201314847\r7E821434D3832363333\r7E82241303034333532\r\r>",
            )
            .with_headerless(
                "0902",
                "014\r0:490201314847\r1:434D3832363333\r2:41303034333532\r\r>",
            )
    }

    /// Add or replace a response (headers on)
    pub fn with(mut self, command: &str, response: &str) -> Self {
        Self::upsert(&mut self.entries, command, response);
        self
    }

    /// Add or replace a response used while headers are off
    pub fn with_headerless(mut self, command: &str, response: &str) -> Self {
        Self::upsert(&mut self.headerless, command, response);
        self
    }

    fn upsert(entries: &mut Vec<(String, String)>, command: &str, response: &str) {
        let command = command.to_ascii_uppercase();
        entries.retain(|(c, _)| *c != command);
        entries.push((command, response.to_string()));
    }

    fn find(&self, command: &str, headers: bool) -> String {
        let lookup = |entries: &[(String, String)]| {
            // Exact match first, then prefix match for parameterised commands
            entries
                .iter()
                .find(|(c, _)| c == command)
                .or_else(|| entries.iter().find(|(c, _)| command.starts_with(c.as_str())))
                .map(|(_, r)| r.clone())
        };

        if !headers {
            if let Some(response) = lookup(&self.headerless) {
                return response;
            }
        }
        lookup(&self.entries).unwrap_or_else(|| UNKNOWN_COMMAND.to_string())
    }
}

/// Behaviour of one emulated (port, bit-rate) combination
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Opens and answers from the table
    Responds(MockResponses),
    /// Opens but never answers
    Silent,
    /// Opening fails
    Unopenable,
}

/// Runtime controls shared by an opener and every transport it opened
#[derive(Debug, Default)]
pub struct MockControl {
    fail_io: AtomicBool,
    sent: Mutex<Vec<String>>,
}

impl MockControl {
    /// Make every read and write fail, as if the adapter was unplugged
    pub fn set_fail_io(&self, fail: bool) {
        self.fail_io.store(fail, Ordering::SeqCst);
    }

    /// Commands written so far, across all transports
    pub fn sent_commands(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    pub fn clear_sent(&self) {
        self.sent.lock().clear();
    }

    fn failing(&self) -> bool {
        self.fail_io.load(Ordering::SeqCst)
    }
}

/// Mock opener with scripted candidates
pub struct MockOpener {
    ports: Vec<String>,
    behaviors: RwLock<HashMap<TransportCandidate, MockBehavior>>,
    latency: Duration,
    probes: Mutex<Vec<TransportCandidate>>,
    control: Arc<MockControl>,
}

impl MockOpener {
    /// Opener exposing `ports`; every candidate is silent until scripted
    pub fn new(ports: Vec<String>) -> Self {
        Self {
            ports,
            behaviors: RwLock::new(HashMap::new()),
            latency: Duration::ZERO,
            probes: Mutex::new(Vec::new()),
            control: Arc::new(MockControl::default()),
        }
    }

    /// Opener with no ports at all
    pub fn no_ports() -> Self {
        Self::new(Vec::new())
    }

    /// Single-port ELM327 emulator described by configuration
    pub fn emulated(config: &MockConfig) -> Self {
        let opener = Self::new(vec![config.port.clone()])
            .with_latency(Duration::from_millis(config.latency_ms));
        opener.script(
            TransportCandidate::new(config.port.clone(), config.baud_rate),
            MockBehavior::Responds(MockResponses::elm327()),
        );
        opener
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Set the behaviour of a candidate
    pub fn script(&self, candidate: TransportCandidate, behavior: MockBehavior) {
        self.behaviors.write().insert(candidate, behavior);
    }

    /// Candidates opened (or attempted) so far, in order
    pub fn probes(&self) -> Vec<TransportCandidate> {
        self.probes.lock().clone()
    }

    pub fn control(&self) -> Arc<MockControl> {
        self.control.clone()
    }
}

#[async_trait]
impl TransportOpener for MockOpener {
    async fn list_ports(&self) -> Result<Vec<String>, TransportError> {
        Ok(self.ports.clone())
    }

    async fn open(
        &self,
        candidate: &TransportCandidate,
    ) -> Result<Box<dyn ByteTransport>, TransportError> {
        self.probes.lock().push(candidate.clone());

        let behavior = self
            .behaviors
            .read()
            .get(candidate)
            .cloned()
            .unwrap_or(MockBehavior::Silent);

        let responses: Option<MockResponses> = match behavior {
            MockBehavior::Unopenable => {
                return Err(TransportError::OpenFailed {
                    port: candidate.port.clone(),
                    reason: "mock port refuses to open".to_string(),
                })
            }
            MockBehavior::Silent => None,
            MockBehavior::Responds(table) => Some(table),
        };

        let echo = responses.as_ref().is_some_and(|r| r.echo);
        Ok(Box::new(MockTransport {
            candidate: candidate.clone(),
            responses,
            pending: VecDeque::new(),
            echo,
            headers: true,
            open: true,
            latency: self.latency,
            control: self.control.clone(),
        }))
    }
}

/// An open emulated adapter
pub struct MockTransport {
    candidate: TransportCandidate,
    responses: Option<MockResponses>,
    pending: VecDeque<u8>,
    echo: bool,
    headers: bool,
    open: bool,
    latency: Duration,
    control: Arc<MockControl>,
}

impl MockTransport {
    fn check_usable(&self) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::Closed);
        }
        Ok(())
    }

    fn respond(&mut self, command: &str) {
        let Some(ref table) = self.responses else {
            return;
        };
        let response = table.find(command, self.headers);
        let echo_supported = table.echo;
        // The echo-off command itself is still echoed
        let echoing = self.echo;

        match command {
            "ATZ" => {
                self.echo = echo_supported;
                self.headers = false;
            }
            "ATE0" => self.echo = false,
            "ATE1" => self.echo = echo_supported,
            "ATH0" => self.headers = false,
            "ATH1" => self.headers = true,
            _ => {}
        }

        if echoing {
            self.pending.extend(command.as_bytes());
            self.pending.push_back(b'\r');
        }
        self.pending.extend(response.as_bytes());
    }
}

#[async_trait]
impl ByteTransport for MockTransport {
    fn candidate(&self) -> &TransportCandidate {
        &self.candidate
    }

    async fn clear_input(&mut self) -> Result<(), TransportError> {
        self.check_usable()?;
        self.pending.clear();
        Ok(())
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.check_usable()?;
        if self.control.failing() {
            return Err(TransportError::WriteFailed("mock adapter unplugged".into()));
        }

        let command = String::from_utf8_lossy(data)
            .trim_matches(|c| c == '\r' || c == '\n')
            .trim()
            .to_ascii_uppercase();
        debug!(candidate = %self.candidate, %command, "Mock transport: received command");
        self.control.sent.lock().push(command.clone());
        self.respond(&command);
        Ok(())
    }

    async fn read_available(&mut self, wait: Duration) -> Result<Vec<u8>, TransportError> {
        self.check_usable()?;
        if self.control.failing() {
            return Err(TransportError::ReadFailed("mock adapter unplugged".into()));
        }

        if self.pending.is_empty() {
            tokio::time::sleep(wait).await;
            return Ok(Vec::new());
        }

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency.min(wait)).await;
        }

        let n = self.pending.len().min(READ_CHUNK);
        Ok(self.pending.drain(..n).collect())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.open = false;
        self.pending.clear();
        Ok(())
    }
}
