// Generic stream transport
//
// Wraps anything that is `Read + Write`: an opened serial device, a pty, or
// a socket already configured by the caller. Read timeouts are the stream's
// own business; a timed-out read is reported as "nothing yet".

use super::{ByteTransport, TransportError, TransportType};
use std::io::{ErrorKind, Read, Write};

pub struct IoTransport<S> {
    stream: S,
    kind: TransportType,
}

impl<S: Read + Write + Send> IoTransport<S> {
    /// Wrap a serial-style stream
    pub fn new(stream: S) -> Self {
        Self::with_type(stream, TransportType::Serial)
    }

    pub fn with_type(stream: S, kind: TransportType) -> Self {
        Self { stream, kind }
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

/// Shared read path for stream-backed transports
pub(crate) fn read_some<R: Read + ?Sized>(reader: &mut R, max: usize) -> Result<Vec<u8>, TransportError> {
    let mut buf = vec![0u8; max.max(1)];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => return Err(TransportError::Closed),
            Ok(n) => {
                buf.truncate(n);
                return Ok(buf);
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                return Ok(Vec::new())
            }
            Err(e) => return Err(e.into()),
        }
    }
}

impl<S: Read + Write + Send> ByteTransport for IoTransport<S> {
    fn transport_type(&self) -> TransportType {
        self.kind
    }

    fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.stream.write_all(data)?;
        self.stream.flush()?;
        Ok(())
    }

    fn receive(&mut self, max: usize) -> Result<Vec<u8>, TransportError> {
        read_some(&mut self.stream, max)
    }
}
