// KISS TNC — packet interface over a raw byte transport
//
// Outbound packets are KISS-encoded and written in one call. Inbound bytes
// accumulate in an rx buffer; complete frames are cut from the front and
// the consumed bytes discarded, so fragmented reads never lose data.

use super::arq::PacketLink;
use super::{kiss, LinkError, FEND};
use crate::transport::ByteTransport;

/// Bytes requested from the transport per receive call
const READ_CHUNK: usize = 4096;
/// Cap on buffered bytes that have not formed a complete frame
const MAX_RX_BUFFER: usize = 64 * 1024;

pub struct KissTnc<T> {
    transport: T,
    rx_buffer: Vec<u8>,
}

impl<T: ByteTransport> KissTnc<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            rx_buffer: Vec::new(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Bytes received but not yet part of a complete frame
    pub fn buffered(&self) -> usize {
        self.rx_buffer.len()
    }

    fn take_frame(&mut self) -> Option<Vec<u8>> {
        while let Some((payload, consumed)) = kiss::next_frame(&self.rx_buffer) {
            // The closing FEND may open the next frame
            self.rx_buffer.drain(..consumed - 1);
            if !payload.is_empty() {
                return Some(payload);
            }
        }
        None
    }

    fn trim_overflow(&mut self) {
        if self.rx_buffer.len() <= MAX_RX_BUFFER {
            return;
        }
        // Keep only the frame currently being assembled, unless that frame
        // is itself oversized
        let keep_from = match self.rx_buffer.iter().rposition(|&b| b == FEND) {
            Some(i) if i > 0 => i,
            _ => self.rx_buffer.len(),
        };
        tracing::debug!(
            discarded = keep_from,
            "KISS rx buffer overflow, discarding stale bytes"
        );
        self.rx_buffer.drain(..keep_from);
    }
}

impl<T: ByteTransport> PacketLink for KissTnc<T> {
    fn send_packet(&mut self, packet: &[u8]) -> Result<(), LinkError> {
        self.transport.send(&kiss::encode(packet))?;
        Ok(())
    }

    fn receive_packet(&mut self) -> Result<Option<Vec<u8>>, LinkError> {
        if let Some(frame) = self.take_frame() {
            return Ok(Some(frame));
        }
        let chunk = self.transport.receive(READ_CHUNK)?;
        if chunk.is_empty() {
            return Ok(None);
        }
        self.rx_buffer.extend_from_slice(&chunk);
        let frame = self.take_frame();
        if frame.is_none() {
            self.trim_overflow();
        }
        Ok(frame)
    }
}
