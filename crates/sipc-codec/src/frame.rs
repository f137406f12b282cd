//! Length-prefixed framing for byte-stream transports.
//!
//! The seqpacket and named-pipe transports keep message boundaries on their
//! own. A stream has none, so each message is preceded by a five-byte header:
//! the total frame length (header included) as four lowercase hex digits and
//! a newline.
//!
//! ```text
//! 000b
//! R 3:abc
//! ```

use bytes::{BufMut, BytesMut};

use crate::error::{CodecError, Result};
use crate::hex::is_hex_digit;

/// Header size: four hex digits and a newline.
pub const FRAME_HEADER_LEN: usize = 5;

/// Largest frame the header can describe, header included.
pub const MAX_FRAME_LEN: usize = 0xffff;

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

/// Prefix `message` with its frame header. The message must be one or more
/// complete entries, so it is non-empty and ends in a newline.
pub fn frame_message(message: &[u8]) -> Result<BytesMut> {
    if message.last() != Some(&b'\n') {
        return Err(CodecError::InvalidEncoding {
            offset: message.len(),
        });
    }
    let len = FRAME_HEADER_LEN + message.len();
    if len > MAX_FRAME_LEN {
        return Err(CodecError::FrameTooLarge {
            len,
            max: MAX_FRAME_LEN,
        });
    }

    let mut out = BytesMut::with_capacity(len);
    for shift in [12, 8, 4, 0] {
        out.put_u8(HEX_DIGITS[(len >> shift) & 0xf]);
    }
    out.put_u8(b'\n');
    out.put_slice(message);
    Ok(out)
}

/// Split the first frame off `buf`.
///
/// Returns `Ok(None)` while the header or body is still incomplete, and
/// otherwise the message body together with the bytes the whole frame
/// occupies.
pub fn unframe(buf: &[u8]) -> Result<Option<(&[u8], usize)>> {
    let Some(header) = buf.get(..FRAME_HEADER_LEN) else {
        return Ok(None);
    };
    if let Some(offset) = header[..4].iter().position(|&b| !is_hex_digit(b)) {
        return Err(CodecError::InvalidEncoding { offset });
    }
    if header[4] != b'\n' {
        return Err(CodecError::InvalidEncoding { offset: 4 });
    }

    let len = header[..4]
        .iter()
        .fold(0usize, |acc, &b| (acc << 4) | hex_value(b));
    if len <= FRAME_HEADER_LEN {
        return Err(CodecError::InvalidEncoding { offset: 0 });
    }
    if len > buf.len() {
        return Ok(None);
    }

    let message = &buf[FRAME_HEADER_LEN..len];
    if message.last() != Some(&b'\n') {
        return Err(CodecError::InvalidEncoding { offset: len - 1 });
    }
    Ok(Some((message, len)))
}

fn hex_value(b: u8) -> usize {
    match b {
        b'0'..=b'9' => usize::from(b - b'0'),
        _ => usize::from(b - b'a' + 10),
    }
}
