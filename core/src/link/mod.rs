//! Radio link layer — framing, error correction and acknowledged delivery
//!
//! This module provides:
//! - KISS framing: byte-stuffed frames with incremental stream de-framing
//! - CRC-16/CCITT checksums over protected blocks
//! - Reed–Solomon FEC: systematic parity that corrects symbol errors in place
//! - Block interleaving: spreads burst errors across FEC codewords
//! - ResilienceCodec: FEC → CRC → interleave pipeline with typed failures
//! - KissTnc: turns a raw byte transport into a packet link
//! - ReliableLink: sliding-window ARQ over any packet link
//!
//! Transmit path:
//! 1. payload is split into MTU-sized segments (ReliableLink)
//! 2. each segment gets FEC parity, a CRC, and optional interleaving
//! 3. the protected block is KISS-framed and written to the transport
//!
//! Receive is the mirror image. Codecs never retry; they classify failures
//! and hand them back. ReliableLink drops whatever fails to decode.

pub mod arq;
pub mod codec;
pub mod crc;
pub mod fec;
pub mod interleave;
pub mod kiss;
pub mod relay;
pub mod tnc;

pub use arq::{PacketLink, ReliableLink};
pub use codec::ResilienceCodec;
pub use crc::{add_crc, crc16_ccitt, verify_crc};
pub use fec::{fec_decode, fec_encode};
pub use interleave::{deinterleave, deinterleave_sized, interleave, interleave_sized};
pub use kiss::{decode, decode_stream, encode, next_frame};
pub use relay::opportunistic_relay;
pub use tnc::KissTnc;

use crate::transport::TransportError;
use thiserror::Error;

/// Malformed framing; the frame is dropped, never fatal
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("Frame does not start with FEND")]
    MissingDelimiter,

    #[error("Invalid escape sequence: FESC followed by 0x{0:02x}")]
    InvalidEscape(u8),

    #[error("Frame ends inside an escape sequence")]
    TruncatedEscape,

    #[error("Unknown segment kind: 0x{0:02x}")]
    UnknownSegment(u8),
}

/// Link layer errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("Format error: {0}")]
    Format(#[from] FormatError),

    #[error("CRC mismatch: expected 0x{expected:04x}, got 0x{actual:04x}")]
    Integrity { expected: u16, actual: u16 },

    #[error("Block too short: need {need} bytes, got {got}")]
    TooShort { need: usize, got: usize },

    #[error("Uncorrectable block: errors exceed FEC capacity")]
    Uncorrectable,

    #[error("FEC parity must be within 1..255, got {0}")]
    InvalidParity(usize),

    #[error("No acknowledgment for segment {seq}")]
    AckTimeout { seq: u8 },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Frame end delimiter
pub const FEND: u8 = 0xC0;
/// Frame escape
pub const FESC: u8 = 0xDB;
/// Escaped FEND
pub const TFEND: u8 = 0xDC;
/// Escaped FESC
pub const TFESC: u8 = 0xDD;
/// KISS port/command byte written after the opening FEND (data frame, port 0)
pub const KISS_PORT: u8 = 0x00;

/// Default number of Reed–Solomon parity symbols per codeword
pub const DEFAULT_FEC_PARITY: usize = 10;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kiss_constants() {
        assert_eq!(FEND, 0xC0);
        assert_eq!(FESC, 0xDB);
        assert_eq!(TFEND, 0xDC);
        assert_eq!(TFESC, 0xDD);
    }

    #[test]
    fn test_format_error_converts() {
        let err: LinkError = FormatError::InvalidEscape(0x41).into();
        assert!(matches!(err, LinkError::Format(FormatError::InvalidEscape(0x41))));
        assert!(err.to_string().contains("0x41"));
    }
}
