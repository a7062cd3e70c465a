//! Conversion between the datagram header (RFC 7252) and the stream header
//! of CoAP over TCP/TLS (RFC 8323).
//!
//! A stream frame starts with one byte holding a 4 bit length nibble and the
//! token length, followed by 0, 1, 2 or 4 extended length bytes, the code and
//! the token. The length covers options and payload only. Stream frames have
//! neither a type nor a message id.
use crate::error::{Error, Result};
use crate::pdu::{DATAGRAM_HEADER_SIZE, DEFAULT_VERSION, MAX_TOKEN_LENGTH};

const EXT8_OFFSET: usize = 13;
const EXT16_OFFSET: usize = 269;
const EXT32_OFFSET: usize = 65805;

// version 1, NON, token length filled in later
const DATAGRAM_NON_BASE: u8 = DEFAULT_VERSION << 6 | 1 << 4;

fn extended_length_size(nibble: u8) -> usize {
    match nibble {
        0..=12 => 0,
        13 => 1,
        14 => 2,
        _ => 4,
    }
}

/// Total size of the frame starting at `buf[0]`, or `None` until enough of the
/// header has arrived to tell.
pub fn frame_length(buf: &[u8]) -> Option<usize> {
    let first = *buf.first()?;
    let nibble = first >> 4;
    let token_length = (first & 0x0f) as usize;
    let ext = extended_length_size(nibble);
    if buf.len() < 1 + ext {
        return None;
    }

    let body = match nibble {
        0..=12 => nibble as usize,
        13 => buf[1] as usize + EXT8_OFFSET,
        14 => u16::from_be_bytes([buf[1], buf[2]]) as usize + EXT16_OFFSET,
        _ => u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]) as usize + EXT32_OFFSET,
    };

    Some(1 + ext + 1 + token_length + body)
}

/// Size of the stream header (without token) for a body of `body_length` bytes.
pub fn stream_header_size(body_length: usize) -> usize {
    match body_length {
        0..=12 => 2,
        13..=268 => 3,
        269..=65804 => 4,
        _ => 6,
    }
}

/// Rewrites one complete stream frame as a NON datagram with message id 0.
pub fn stream_to_datagram(frame: &[u8]) -> Result<Vec<u8>> {
    let total = frame_length(frame)
        .ok_or_else(|| Error::Malformed("truncated stream header".to_string()))?;
    if frame.len() < total {
        return Err(Error::Malformed(format!(
            "stream frame announces {} bytes, got {}",
            total,
            frame.len()
        )));
    }

    let token_length = frame[0] & 0x0f;
    if token_length as usize > MAX_TOKEN_LENGTH {
        return Err(Error::Malformed(format!(
            "invalid token length {}",
            token_length
        )));
    }

    let ext = extended_length_size(frame[0] >> 4);
    let code = frame[1 + ext];
    let rest = &frame[2 + ext..total];

    let mut datagram = Vec::with_capacity(DATAGRAM_HEADER_SIZE + rest.len());
    datagram.push(DATAGRAM_NON_BASE | token_length);
    datagram.push(code);
    datagram.extend_from_slice(&[0, 0]);
    datagram.extend_from_slice(rest);
    Ok(datagram)
}

/// Rewrites an encoded datagram as a stream frame, dropping type and message id.
pub fn datagram_to_stream(datagram: &[u8]) -> Result<Vec<u8>> {
    if datagram.len() < DATAGRAM_HEADER_SIZE {
        return Err(Error::Malformed("truncated datagram header".to_string()));
    }
    let token_length = datagram[0] & 0x0f;
    let token_end = DATAGRAM_HEADER_SIZE + token_length as usize;
    if token_length as usize > MAX_TOKEN_LENGTH || datagram.len() < token_end {
        return Err(Error::Malformed(format!(
            "invalid token length {}",
            token_length
        )));
    }

    let code = datagram[1];
    let token = &datagram[DATAGRAM_HEADER_SIZE..token_end];
    let body = &datagram[token_end..];
    let body_length = body.len();

    let mut frame = Vec::with_capacity(stream_header_size(body_length) + token.len() + body_length);
    match body_length {
        0..=12 => frame.push((body_length as u8) << 4 | token_length),
        13..=268 => {
            frame.push(13 << 4 | token_length);
            frame.push((body_length - EXT8_OFFSET) as u8);
        }
        269..=65804 => {
            frame.push(14 << 4 | token_length);
            frame.extend_from_slice(&((body_length - EXT16_OFFSET) as u16).to_be_bytes());
        }
        _ => {
            frame.push(15 << 4 | token_length);
            let extended = u32::try_from(body_length - EXT32_OFFSET).map_err(|_| {
                Error::TooLarge {
                    size: body_length,
                    max: u32::MAX as usize + EXT32_OFFSET,
                }
            })?;
            frame.extend_from_slice(&extended.to_be_bytes());
        }
    }
    frame.push(code);
    frame.extend_from_slice(token);
    frame.extend_from_slice(body);
    Ok(frame)
}
