// Serial modem transport — TNCs and radios on a local port
//
// Opens lazily like the TCP modem and drops the port on any hard error.
// The modem-control lines double as the busy signal: a radio asserting
// CTS or carrier-detect has the channel.

use super::io::read_some;
use super::{ByteTransport, TransportError, TransportType};
use crate::config::SerialConfig;
use parking_lot::Mutex;
use serialport::SerialPort;
use std::io::{Read, Write};
use std::time::Duration;

/// Per-rate timeout while negotiating
const NEGOTIATE_TIMEOUT: Duration = Duration::from_millis(500);

/// Byte written to wake the radio while negotiating
const NEGOTIATE_QUERY: &[u8] = b"?";

pub struct SerialModem {
    config: SerialConfig,
    // `is_busy` only gets `&self` but reading modem lines needs `&mut`
    port: Mutex<Option<Box<dyn SerialPort>>>,
}

impl SerialModem {
    pub fn new(config: SerialConfig) -> Self {
        Self {
            config,
            port: Mutex::new(None),
        }
    }

    /// Wrap a port the caller already opened
    pub fn from_port(config: SerialConfig, port: Box<dyn SerialPort>) -> Self {
        Self {
            config,
            port: Mutex::new(Some(port)),
        }
    }

    pub fn baud_rate(&self) -> u32 {
        self.config.baud_rate
    }

    pub fn is_open(&self) -> bool {
        self.port.lock().is_some()
    }

    /// Open the port now instead of on first use
    pub fn open(&mut self) -> Result<(), TransportError> {
        self.with_port(|_| Ok(()))
    }

    pub fn close(&mut self) {
        if self.port.lock().take().is_some() {
            tracing::debug!("Closed serial port {}", self.config.path);
        }
    }

    /// Find the fastest rate at which the radio answers
    ///
    /// Each rate is tried in order: open, send a wake byte, wait briefly for
    /// any reply. The first rate that answers becomes the working rate and
    /// its port is kept open.
    pub fn negotiate_baud(&mut self, rates: &[u32]) -> Result<u32, TransportError> {
        self.close();
        for &rate in rates {
            let mut port = match open_port(&self.config.path, rate, NEGOTIATE_TIMEOUT) {
                Ok(port) => port,
                Err(e) => {
                    tracing::debug!(rate, error = %e, "Baud rate unavailable");
                    continue;
                }
            };
            if answers(&mut *port) {
                port.set_timeout(self.config.timeout())
                    .map_err(|e| connection_failed(&self.config.path, e))?;
                self.config.baud_rate = rate;
                *self.port.lock() = Some(port);
                tracing::info!(rate, path = %self.config.path, "Negotiated serial baud rate");
                return Ok(rate);
            }
            tracing::debug!(rate, "No answer at baud rate");
        }
        Err(TransportError::ConnectionFailed(format!(
            "{}: no supported baud rate among {:?}",
            self.config.path, rates
        )))
    }

    fn with_port<R>(
        &self,
        f: impl FnOnce(&mut dyn SerialPort) -> Result<R, TransportError>,
    ) -> Result<R, TransportError> {
        let mut guard = self.port.lock();
        if guard.is_none() {
            *guard = Some(open_port(
                &self.config.path,
                self.config.baud_rate,
                self.config.timeout(),
            )?);
            tracing::info!(
                path = %self.config.path,
                baud = self.config.baud_rate,
                "Opened serial port"
            );
        }
        let port = guard
            .as_mut()
            .ok_or_else(|| TransportError::ConnectionFailed("port not open".to_string()))?;
        let result = f(&mut **port);
        if matches!(result, Err(TransportError::Io(_)) | Err(TransportError::Closed)) {
            *guard = None;
        }
        result
    }
}

fn open_port(path: &str, baud: u32, timeout: Duration) -> Result<Box<dyn SerialPort>, TransportError> {
    serialport::new(path, baud)
        .timeout(timeout)
        .open()
        .map_err(|e| connection_failed(path, e))
}

fn connection_failed(path: &str, e: serialport::Error) -> TransportError {
    TransportError::ConnectionFailed(format!("{}: {}", path, e))
}

fn answers(port: &mut dyn SerialPort) -> bool {
    if port.write_all(NEGOTIATE_QUERY).and_then(|_| port.flush()).is_err() {
        return false;
    }
    let mut reply = [0u8; 1];
    matches!(port.read(&mut reply), Ok(n) if n > 0)
}

impl ByteTransport for SerialModem {
    fn transport_type(&self) -> TransportType {
        TransportType::Serial
    }

    fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.with_port(|port| {
            port.write_all(data)?;
            port.flush()?;
            Ok(())
        })
    }

    fn receive(&mut self, max: usize) -> Result<Vec<u8>, TransportError> {
        self.with_port(|port| read_some(port, max))
    }

    /// CTS or DCD asserted; a port that cannot report its lines is idle
    fn is_busy(&self) -> bool {
        self.with_port(|port| {
            let cts = port.read_clear_to_send().unwrap_or(false);
            let dcd = port.read_carrier_detect().unwrap_or(false);
            Ok(cts || dcd)
        })
        .unwrap_or(false)
    }
}
