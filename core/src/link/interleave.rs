//! Block interleaving — spreads burst errors across FEC codewords
//!
//! Data is written row-wise into rows of `block` bytes and read out
//! column-wise. A burst of `k` consecutive corrupted bytes on the air
//! lands on roughly `k / block` bytes of each row after deinterleaving.
//!
//! Two variants exist:
//! - [`interleave`] / [`deinterleave`] pad with a zero sentinel that is
//!   stripped on the way back, so payloads ending in 0x00 lose those bytes.
//! - [`interleave_sized`] / [`deinterleave_sized`] carry a 4-byte length
//!   prefix and round-trip any payload exactly. The link pipeline uses these.

use super::LinkError;

const PAD: u8 = 0x00;
const LEN_PREFIX: usize = 4;

fn to_columns(data: &[u8], block: usize) -> Vec<u8> {
    let rows = (data.len() + block - 1) / block;
    let mut out = Vec::with_capacity(rows * block);
    for col in 0..block {
        for row in 0..rows {
            out.push(data.get(row * block + col).copied().unwrap_or(PAD));
        }
    }
    out
}

fn from_columns(data: &[u8], block: usize) -> Vec<u8> {
    let rows = data.len() / block;
    let mut out = vec![PAD; rows * block];
    let mut idx = 0;
    for col in 0..block {
        for row in 0..rows {
            out[row * block + col] = data[idx];
            idx += 1;
        }
    }
    out
}

/// Interleave `data` in rows of `block` bytes, padding the last row with zeros
pub fn interleave(data: &[u8], block: usize) -> Vec<u8> {
    if block <= 1 {
        return data.to_vec();
    }
    to_columns(data, block)
}

/// Reverse [`interleave`], stripping trailing zero padding
pub fn deinterleave(data: &[u8], block: usize) -> Vec<u8> {
    if block <= 1 {
        return data.to_vec();
    }
    let mut out = from_columns(data, block);
    let keep = out.iter().rposition(|&b| b != PAD).map_or(0, |i| i + 1);
    out.truncate(keep);
    out
}

/// Interleave with a big-endian length prefix so padding is unambiguous
pub fn interleave_sized(data: &[u8], block: usize) -> Vec<u8> {
    let mut framed = Vec::with_capacity(data.len() + LEN_PREFIX);
    framed.extend_from_slice(&(data.len() as u32).to_be_bytes());
    framed.extend_from_slice(data);
    if block <= 1 {
        return framed;
    }
    to_columns(&framed, block)
}

/// Reverse [`interleave_sized`]
pub fn deinterleave_sized(data: &[u8], block: usize) -> Result<Vec<u8>, LinkError> {
    let framed = if block <= 1 {
        data.to_vec()
    } else {
        from_columns(data, block)
    };
    if framed.len() < LEN_PREFIX {
        return Err(LinkError::TooShort {
            need: LEN_PREFIX,
            got: framed.len(),
        });
    }

    let len = u32::from_be_bytes([framed[0], framed[1], framed[2], framed[3]]) as usize;
    let available = framed.len() - LEN_PREFIX;
    if len > available {
        return Err(LinkError::TooShort {
            need: len + LEN_PREFIX,
            got: framed.len(),
        });
    }
    Ok(framed[LEN_PREFIX..LEN_PREFIX + len].to_vec())
}
