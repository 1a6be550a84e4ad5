//! Serial port transport (tokio-serial)

use std::io::ErrorKind;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{
    ClearBuffer, DataBits, FlowControl, Parity, SerialPort, SerialPortBuilderExt, SerialStream,
    StopBits,
};
use tracing::{debug, trace};

use super::{ByteTransport, TransportCandidate, TransportError, TransportOpener};

const READ_CHUNK: usize = 256;

/// Opens serial ports with the framing ELM327-style adapters expect
pub struct SerialOpener {
    io_timeout: Duration,
}

impl SerialOpener {
    pub fn new(io_timeout: Duration) -> Self {
        Self { io_timeout }
    }
}

#[async_trait]
impl TransportOpener for SerialOpener {
    async fn list_ports(&self) -> Result<Vec<String>, TransportError> {
        let ports = tokio_serial::available_ports()
            .map_err(|e| TransportError::EnumerationFailed(e.to_string()))?;
        Ok(ports.into_iter().map(|p| p.port_name).collect())
    }

    async fn open(
        &self,
        candidate: &TransportCandidate,
    ) -> Result<Box<dyn ByteTransport>, TransportError> {
        let open_failed = |reason: String| TransportError::OpenFailed {
            port: candidate.port.clone(),
            reason,
        };

        let mut stream = tokio_serial::new(candidate.port.as_str(), candidate.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(self.io_timeout)
            .open_native_async()
            .map_err(|e| open_failed(e.to_string()))?;

        stream
            .write_data_terminal_ready(true)
            .map_err(|e| open_failed(format!("DTR: {}", e)))?;
        stream
            .write_request_to_send(true)
            .map_err(|e| open_failed(format!("RTS: {}", e)))?;

        debug!(candidate = %candidate, "Serial port opened");
        Ok(Box::new(SerialTransport {
            candidate: candidate.clone(),
            stream: Some(stream),
        }))
    }
}

/// An open serial port
pub struct SerialTransport {
    candidate: TransportCandidate,
    stream: Option<SerialStream>,
}

impl SerialTransport {
    fn stream(&mut self) -> Result<&mut SerialStream, TransportError> {
        self.stream.as_mut().ok_or(TransportError::Closed)
    }
}

#[async_trait]
impl ByteTransport for SerialTransport {
    fn candidate(&self) -> &TransportCandidate {
        &self.candidate
    }

    async fn clear_input(&mut self) -> Result<(), TransportError> {
        self.stream()?
            .clear(ClearBuffer::Input)
            .map_err(|e| TransportError::ReadFailed(format!("clear input: {}", e)))
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let stream = self.stream()?;
        stream
            .write_all(data)
            .await
            .map_err(|e| TransportError::WriteFailed(e.to_string()))?;
        stream
            .flush()
            .await
            .map_err(|e| TransportError::WriteFailed(e.to_string()))
    }

    async fn read_available(&mut self, wait: Duration) -> Result<Vec<u8>, TransportError> {
        let stream = self.stream()?;
        let mut buf = [0u8; READ_CHUNK];

        match tokio::time::timeout(wait, stream.read(&mut buf)).await {
            Ok(Ok(n)) => {
                trace!(bytes = n, "Serial read");
                Ok(buf[..n].to_vec())
            }
            Ok(Err(e)) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => {
                Ok(Vec::new())
            }
            Ok(Err(e)) => Err(TransportError::ReadFailed(e.to_string())),
            Err(_) => Ok(Vec::new()),
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.stream.take().is_some() {
            debug!(candidate = %self.candidate, "Serial port closed");
        }
        Ok(())
    }
}
