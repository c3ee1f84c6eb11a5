//! ResilienceCodec — FEC, checksum and interleaving as one pipeline
//!
//! protect:  payload → RS parity → CRC-16 → interleave
//! recover:  deinterleave → CRC-16 check → RS correction → payload
//!
//! The checksum is verified before FEC runs, so a CRC failure surfaces as
//! `LinkError::Integrity` and an over-capacity codeword as
//! `LinkError::Uncorrectable`; callers can tell the two apart.

use super::crc::{add_crc, verify_crc};
use super::fec::{fec_decode, fec_encode, MAX_PARITY};
use super::interleave::{deinterleave_sized, interleave_sized};
use super::LinkError;
use crate::config::LinkConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResilienceCodec {
    parity: usize,
    interleave_depth: usize,
}

impl ResilienceCodec {
    /// `parity` is clamped into `1..=254`
    pub fn new(parity: usize, interleave_depth: usize) -> Self {
        Self {
            parity: parity.clamp(1, MAX_PARITY),
            interleave_depth,
        }
    }

    pub fn from_config(config: &LinkConfig) -> Self {
        Self::new(config.fec_parity, config.interleave_depth)
    }

    pub fn parity(&self) -> usize {
        self.parity
    }

    /// Wrap a payload for the air
    pub fn protect(&self, payload: &[u8]) -> Result<Vec<u8>, LinkError> {
        let block = add_crc(&fec_encode(payload, self.parity)?);
        if self.interleave_depth > 1 {
            Ok(interleave_sized(&block, self.interleave_depth))
        } else {
            Ok(block)
        }
    }

    /// Verify and correct a received block
    pub fn recover(&self, block: &[u8]) -> Result<Vec<u8>, LinkError> {
        let block = if self.interleave_depth > 1 {
            deinterleave_sized(block, self.interleave_depth)?
        } else {
            block.to_vec()
        };
        let encoded = verify_crc(&block)?;
        fec_decode(encoded, self.parity)
    }
}

impl Default for ResilienceCodec {
    fn default() -> Self {
        Self::from_config(&LinkConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protect_recover() {
        let codec = ResilienceCodec::default();
        let block = codec.protect(b"segment payload").unwrap();
        assert_eq!(block.len(), 15 + 10 + 2);
        assert_eq!(codec.recover(&block).unwrap(), b"segment payload");
    }

    #[test]
    fn test_interleaved_keeps_trailing_zero() {
        let codec = ResilienceCodec::new(10, 8);
        let payload = b"ends with zero\x00";
        let block = codec.protect(payload).unwrap();
        assert_eq!(codec.recover(&block).unwrap(), payload);
    }

    #[test]
    fn test_parity_clamped() {
        assert_eq!(ResilienceCodec::new(0, 1).parity(), 1);
        assert_eq!(ResilienceCodec::new(1_000, 1).parity(), MAX_PARITY);

        let codec = ResilienceCodec::new(0, 4);
        let block = codec.protect(b"still works").unwrap();
        assert_eq!(codec.recover(&block).unwrap(), b"still works");
    }

    #[test]
    fn test_corruption_is_integrity_error() {
        let codec = ResilienceCodec::default();
        let mut block = codec.protect(b"payload").unwrap();
        block[1] ^= 0x01;
        assert!(matches!(
            codec.recover(&block),
            Err(LinkError::Integrity { .. })
        ));
    }

    #[test]
    fn test_checksum_valid_but_fec_overloaded() {
        // Damage the FEC codeword beyond capacity, then re-checksum it so the
        // structural check passes and the content check must fail
        let codec = ResilienceCodec::default();
        let mut encoded = fec_encode(b"hello world", 10).unwrap();
        for pos in [0, 2, 4, 6, 8, 10] {
            encoded[pos] ^= 0xA5;
        }
        let block = add_crc(&encoded);
        assert_eq!(codec.recover(&block), Err(LinkError::Uncorrectable));
    }
}
