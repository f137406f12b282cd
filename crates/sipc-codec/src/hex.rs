//! Canonical lowercase hex for unsigned 64-bit magnitudes.

use bytes::BufMut;

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

/// A hex literal read from the front of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HexLiteral {
    /// The accumulated value. When `overflow_bits > 0` this holds only the
    /// leading digits that fit.
    pub value: u64,
    /// Four bits for every digit that did not fit in 64 bits.
    pub overflow_bits: u32,
    /// Number of input bytes consumed.
    pub consumed: usize,
}

/// Whether `b` is a lowercase hex digit.
#[inline]
pub fn is_hex_digit(b: u8) -> bool {
    matches!(b, b'0'..=b'9' | b'a'..=b'f')
}

#[inline]
fn digit_value(b: u8) -> u64 {
    match b {
        b'0'..=b'9' => u64::from(b - b'0'),
        _ => u64::from(b - b'a' + 10),
    }
}

/// Append `v` as lowercase hex with no leading zeros. Zero is `"0"`.
pub fn encode_hex<B: BufMut>(dst: &mut B, mut v: u64) {
    let mut buf = [0u8; 16];
    let mut i = buf.len();
    loop {
        i -= 1;
        buf[i] = HEX_DIGITS[(v & 15) as usize];
        v >>= 4;
        if v == 0 {
            break;
        }
    }
    dst.put_slice(&buf[i..]);
}

/// Read a hex literal from the front of `input`.
///
/// Returns `None` when the first byte is not a hex digit. A leading `'0'` is
/// the whole literal: any digit after it is left unconsumed, so a spelling
/// with leading zeros fails at the caller's next delimiter check.
///
/// Digits that no longer fit in 64 bits are still consumed so the cursor
/// stays on a token boundary; they are reported through `overflow_bits`.
pub fn decode_hex(input: &[u8]) -> Option<HexLiteral> {
    let first = *input.first()?;
    if !is_hex_digit(first) {
        return None;
    }
    if first == b'0' {
        return Some(HexLiteral {
            value: 0,
            overflow_bits: 0,
            consumed: 1,
        });
    }

    let mut value = digit_value(first);
    let mut consumed = 1;
    let mut overflow_bits = 0u32;
    for &b in &input[1..] {
        if !is_hex_digit(b) {
            break;
        }
        consumed += 1;
        if overflow_bits > 0 || value > u64::MAX >> 4 {
            overflow_bits = overflow_bits.saturating_add(4);
        } else {
            value = (value << 4) | digit_value(b);
        }
    }

    Some(HexLiteral {
        value,
        overflow_bits,
        consumed,
    })
}
