//! Byte-level access to the serial line.
//!
//! The Lake Shore 625 talks 7 data bits, odd parity, 1 stop bit. Only the port path
//! and the baud rate are configurable; the frame format and the read timeout are fixed.

use crate::constants::{DEFAULT_BAUD_RATE, DEFAULT_PORT, READ_TIMEOUT};
use crate::error::LsError;
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{self, Read, Write};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Serial connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }
}

impl SerialConfig {
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            ..Default::default()
        }
    }

    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn data_bits(&self) -> DataBits {
        DataBits::Seven
    }

    pub fn parity(&self) -> Parity {
        Parity::Odd
    }

    pub fn stop_bits(&self) -> StopBits {
        StopBits::One
    }

    pub fn read_timeout(&self) -> Duration {
        READ_TIMEOUT
    }
}

/// A half-duplex, line-oriented byte stream to the instrument.
///
/// Implementations are driven by exactly one owner; nothing here is meant to be
/// called concurrently.
pub trait Transport {
    /// Discards unread input, then writes `line` (already terminated) in full.
    fn write_line(&mut self, line: &[u8]) -> Result<(), LsError>;

    /// Reads up to and including the next `\n`.
    ///
    /// Returns `Ok(None)` when the read timed out before any byte arrived. Bytes
    /// received before a timeout are returned as a partial line.
    fn read_line(&mut self) -> Result<Option<Vec<u8>>, LsError>;

    /// Releases the connection. Safe to call any number of times.
    fn close(&mut self);

    fn is_open(&self) -> bool;
}

/// [`Transport`] over a local serial port.
pub struct SerialTransport {
    port: Option<Box<dyn SerialPort>>,
    name: String,
    read_timeout: Duration,
}

impl SerialTransport {
    pub fn open(config: &SerialConfig) -> Result<Self, LsError> {
        info!(port = %config.port, baud = config.baud_rate, "Opening serial port (7O1)");
        let port = serialport::new(&config.port, config.baud_rate)
            .data_bits(config.data_bits())
            .parity(config.parity())
            .stop_bits(config.stop_bits())
            .flow_control(FlowControl::None)
            .timeout(config.read_timeout())
            .open()?;

        Ok(Self::from_port(port))
    }

    /// Wrap a port that is already open and configured. Its current timeout becomes
    /// the line read deadline.
    pub fn from_port(port: Box<dyn SerialPort>) -> Self {
        Self {
            name: port.name().unwrap_or_default(),
            read_timeout: port.timeout(),
            port: Some(port),
        }
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn SerialPort>, LsError> {
        self.port.as_mut().ok_or(LsError::NotConnected)
    }
}

impl Transport for SerialTransport {
    fn write_line(&mut self, line: &[u8]) -> Result<(), LsError> {
        let port = self.port_mut()?;
        port.clear(ClearBuffer::Input)?;
        port.write_all(line)?;
        port.flush()?;
        Ok(())
    }

    fn read_line(&mut self) -> Result<Option<Vec<u8>>, LsError> {
        let deadline = Instant::now() + self.read_timeout;
        let port = self.port_mut()?;

        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            match port.read(&mut byte) {
                Ok(1) => {
                    line.push(byte[0]);
                    if byte[0] == b'\n' {
                        break;
                    }
                }
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::TimedOut => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
            if Instant::now() >= deadline {
                break;
            }
        }

        if line.is_empty() {
            Ok(None)
        } else {
            if line.last() != Some(&b'\n') {
                warn!(bytes = line.len(), "Read timed out mid-line, returning partial response");
            }
            Ok(Some(line))
        }
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            debug!(port = %self.name, "Serial port closed");
        }
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        self.close();
    }
}
