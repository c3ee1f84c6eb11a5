// Transport module — raw byte pipes to the radio modem
//
// Everything above this layer (KISS, FEC, ARQ) speaks bytes. A transport
// only moves them: a VaraHF-style TCP socket, a serial device, or an
// in-process simulation.

pub mod io;
pub mod serial;
pub mod simulated;
pub mod tcp;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

pub use io::IoTransport;
pub use serial::SerialModem;
pub use simulated::SimulatedModem;
pub use tcp::TcpModem;

/// Kinds of modem connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportType {
    /// Modem reachable over TCP (VaraHF, Direwolf KISS port)
    Tcp,
    /// Serial or character-device TNC
    Serial,
    /// In-process loopback for tests
    Simulated,
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportType::Tcp => write!(f, "TCP"),
            TransportType::Serial => write!(f, "Serial"),
            TransportType::Simulated => write!(f, "Simulated"),
        }
    }
}

/// Errors that can occur in the transport layer
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Transport closed by peer")]
    Closed,
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        TransportError::Io(e.to_string())
    }
}

/// A bidirectional byte pipe to a modem
pub trait ByteTransport: Send {
    fn transport_type(&self) -> TransportType;

    /// Write all of `data`
    fn send(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Read up to `max` bytes; an empty vector means nothing arrived in time
    fn receive(&mut self, max: usize) -> Result<Vec<u8>, TransportError>;

    /// Whether the channel is currently occupied by another station
    fn is_busy(&self) -> bool {
        false
    }
}

impl<T: ByteTransport + ?Sized> ByteTransport for Box<T> {
    fn transport_type(&self) -> TransportType {
        (**self).transport_type()
    }

    fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        (**self).send(data)
    }

    fn receive(&mut self, max: usize) -> Result<Vec<u8>, TransportError> {
        (**self).receive(max)
    }

    fn is_busy(&self) -> bool {
        (**self).is_busy()
    }
}

/// One transport shared between the link, the scheduler and the heartbeat
///
/// Each call holds the lock only for the duration of that call, so writers
/// interleave at whole-buffer granularity.
pub struct SharedTransport<T> {
    inner: Arc<Mutex<T>>,
}

impl<T> Clone for SharedTransport<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: ByteTransport> SharedTransport<T> {
    pub fn new(transport: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(transport)),
        }
    }

    /// Run `f` with exclusive access to the underlying transport
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.inner.lock())
    }
}

impl<T: ByteTransport> ByteTransport for SharedTransport<T> {
    fn transport_type(&self) -> TransportType {
        self.inner.lock().transport_type()
    }

    fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.inner.lock().send(data)
    }

    fn receive(&mut self, max: usize) -> Result<Vec<u8>, TransportError> {
        self.inner.lock().receive(max)
    }

    fn is_busy(&self) -> bool {
        self.inner.lock().is_busy()
    }
}
