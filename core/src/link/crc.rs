/// CRC-16/CCITT-FALSE checksum framing
///
/// Polynomial 0x1021, init 0xFFFF, no reflection, no final XOR.
/// The checksum is appended big-endian as the trailing two bytes.

use super::LinkError;

const POLY: u16 = 0x1021;
const INIT: u16 = 0xFFFF;

/// Length of the appended checksum
pub const CRC_LEN: usize = 2;

const TABLE: [u16; 256] = build_table();

const fn build_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u16) << 8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ POLY
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Compute CRC-16/CCITT-FALSE over `data`
pub fn crc16_ccitt(data: &[u8]) -> u16 {
    data.iter().fold(INIT, |crc, &b| {
        (crc << 8) ^ TABLE[((crc >> 8) as u8 ^ b) as usize]
    })
}

/// Append a big-endian CRC-16 to `data`
pub fn add_crc(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + CRC_LEN);
    out.extend_from_slice(data);
    out.extend_from_slice(&crc16_ccitt(data).to_be_bytes());
    out
}

/// Check the trailing CRC-16 and return the covered bytes
pub fn verify_crc(frame: &[u8]) -> Result<&[u8], LinkError> {
    if frame.len() < CRC_LEN {
        return Err(LinkError::TooShort {
            need: CRC_LEN,
            got: frame.len(),
        });
    }

    let (data, chk) = frame.split_at(frame.len() - CRC_LEN);
    let expected = u16::from_be_bytes([chk[0], chk[1]]);
    let actual = crc16_ccitt(data);
    if expected != actual {
        return Err(LinkError::Integrity { expected, actual });
    }
    Ok(data)
}
