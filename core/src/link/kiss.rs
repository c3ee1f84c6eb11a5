/// KISS framing — byte stuffing for TNC-style serial and TCP links
///
/// Format:
/// [1 byte]  FEND (0xC0)
/// [1 byte]  port/command (0x00)
/// [N bytes] payload with FEND → FESC TFEND and FESC → FESC TFESC
/// [1 byte]  FEND (0xC0)

use super::{FormatError, FEND, FESC, KISS_PORT, TFEND, TFESC};

/// Encode raw bytes into a KISS frame on port 0
pub fn encode(payload: &[u8]) -> Vec<u8> {
    // Worst case every byte is escaped
    let mut frame = Vec::with_capacity(payload.len() * 2 + 3);
    frame.push(FEND);
    frame.push(KISS_PORT);
    for &b in payload {
        match b {
            FEND => frame.extend_from_slice(&[FESC, TFEND]),
            FESC => frame.extend_from_slice(&[FESC, TFESC]),
            other => frame.push(other),
        }
    }
    frame.push(FEND);
    frame
}

/// Decode a single KISS frame into its payload
///
/// The frame must start with FEND; the port byte is skipped and decoding
/// stops at the closing FEND (or the end of input).
pub fn decode(frame: &[u8]) -> Result<Vec<u8>, FormatError> {
    if frame.first() != Some(&FEND) {
        return Err(FormatError::MissingDelimiter);
    }

    let mut payload = Vec::with_capacity(frame.len());
    let mut escaped = false;
    for &b in frame.iter().skip(2) {
        if escaped {
            match b {
                TFEND => payload.push(FEND),
                TFESC => payload.push(FESC),
                other => return Err(FormatError::InvalidEscape(other)),
            }
            escaped = false;
            continue;
        }
        match b {
            FESC => escaped = true,
            FEND => break,
            other => payload.push(other),
        }
    }

    if escaped {
        return Err(FormatError::TruncatedEscape);
    }
    Ok(payload)
}

/// Find the first complete frame in a possibly fragmented buffer
///
/// Returns the payload and the number of bytes consumed through the closing
/// FEND, or `None` when no complete frame is available yet. Bytes before
/// the first FEND are line noise and are skipped. Back-to-back FENDs are
/// treated as idle fill, not as empty frames. Unknown escape codes are
/// passed through verbatim so a noisy byte never stalls the stream.
pub fn next_frame(buf: &[u8]) -> Option<(Vec<u8>, usize)> {
    let mut body: Vec<u8> = Vec::new();
    let mut in_frame = false;
    let mut escaped = false;

    for (i, &b) in buf.iter().enumerate() {
        if !in_frame {
            if b == FEND {
                in_frame = true;
                body.clear();
            }
            continue;
        }
        if escaped {
            body.push(match b {
                TFEND => FEND,
                TFESC => FESC,
                other => other,
            });
            escaped = false;
            continue;
        }
        match b {
            FESC => escaped = true,
            FEND if body.is_empty() => {
                // Idle fill: this FEND opens the next frame instead
            }
            FEND => {
                // Drop the port byte
                let payload = body.split_off(1);
                return Some((payload, i + 1));
            }
            other => body.push(other),
        }
    }
    None
}

/// Extract the payload of the first complete frame in `stream`
///
/// The buffer is not modified; callers that keep reading should use
/// [`next_frame`] to learn how many bytes to discard.
pub fn decode_stream(stream: &[u8]) -> Option<Vec<u8>> {
    next_frame(stream).map(|(payload, _)| payload)
}
