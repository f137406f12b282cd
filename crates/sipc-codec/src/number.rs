//! Canonical decomposition shared by the encoder, the parser and `Value`
//! equality. Every finite non-zero number is `significand * 2^exponent` with
//! an odd significand, which is the one spelling the wire format accepts.

use bytes::BufMut;

use crate::hex::encode_hex;
use crate::value::Value;

/// Exponents in `0..DIRECT_FORM_LIMIT` are written without a `p` suffix.
pub(crate) const DIRECT_FORM_LIMIT: i32 = 8;

/// Significant bits an IEEE-754 double can hold exactly.
const F64_SIGNIFICAND_BITS: u32 = 53;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Number {
    Zero,
    Finite {
        negative: bool,
        significand: u64,
        exponent: i32,
    },
    Infinite {
        negative: bool,
    },
    NaN,
}

impl Number {
    pub(crate) fn from_u64(v: u64) -> Self {
        Self::from_magnitude(false, v)
    }

    pub(crate) fn from_i64(v: i64) -> Self {
        Self::from_magnitude(v < 0, v.unsigned_abs())
    }

    fn from_magnitude(negative: bool, magnitude: u64) -> Self {
        if magnitude == 0 {
            return Self::Zero;
        }
        let shift = magnitude.trailing_zeros();
        Self::Finite {
            negative,
            significand: magnitude >> shift,
            exponent: shift as i32,
        }
    }

    /// Subnormals collapse to zero, as does negative zero.
    pub(crate) fn from_f64(v: f64) -> Self {
        let bits = v.to_bits();
        let negative = bits >> 63 != 0;
        let biased = ((bits >> 52) & 0x7ff) as i32;
        let fraction = bits & ((1 << 52) - 1);

        match biased {
            0 => Self::Zero,
            0x7ff if fraction != 0 => Self::NaN,
            0x7ff => Self::Infinite { negative },
            _ => {
                let whole = fraction | (1 << 52);
                let shift = whole.trailing_zeros();
                Self::Finite {
                    negative,
                    significand: whole >> shift,
                    exponent: biased - 1075 + shift as i32,
                }
            }
        }
    }

    pub(crate) fn of(value: &Value) -> Option<Self> {
        match *value {
            Value::Int(v) => Some(Self::from_i64(v)),
            Value::Uint(v) => Some(Self::from_u64(v)),
            Value::Float(v) => Some(Self::from_f64(v)),
            _ => None,
        }
    }

    /// Append the canonical token (without the leading separator).
    pub(crate) fn encode<B: BufMut>(&self, dst: &mut B) {
        match *self {
            Self::Zero => dst.put_u8(b'0'),
            Self::NaN => dst.put_slice(b"nan"),
            Self::Infinite { negative: false } => dst.put_slice(b"inf"),
            Self::Infinite { negative: true } => dst.put_slice(b"-inf"),
            Self::Finite {
                negative,
                significand,
                exponent,
            } => {
                if negative {
                    dst.put_u8(b'-');
                }
                if (0..DIRECT_FORM_LIMIT).contains(&exponent) {
                    encode_hex(dst, significand << exponent);
                } else {
                    encode_hex(dst, significand);
                    dst.put_u8(b'p');
                    if exponent < 0 {
                        dst.put_u8(b'-');
                    }
                    encode_hex(dst, u64::from(exponent.unsigned_abs()));
                }
            }
        }
    }

    /// Resolve to the narrowest value kind: integers when the number is
    /// integral and in range, a double otherwise.
    pub(crate) fn into_value(self) -> Value {
        match self {
            Self::Zero => Value::Uint(0),
            Self::NaN => Value::Float(f64::NAN),
            Self::Infinite { negative: false } => Value::Float(f64::INFINITY),
            Self::Infinite { negative: true } => Value::Float(f64::NEG_INFINITY),
            Self::Finite {
                negative,
                significand,
                exponent,
            } => {
                if let Some(magnitude) = integral_magnitude(significand, exponent) {
                    if !negative {
                        return Value::Uint(magnitude);
                    }
                    if magnitude <= 1 << 63 {
                        return Value::Int((magnitude as i64).wrapping_neg());
                    }
                }
                Value::Float(build_f64(negative, significand, exponent))
            }
        }
    }
}

/// `significand << exponent` when that is a whole number fitting in u64.
pub(crate) fn integral_magnitude(significand: u64, exponent: i32) -> Option<u64> {
    if exponent >= 0 && exponent as u32 <= significand.leading_zeros() {
        Some(significand << exponent)
    } else {
        None
    }
}

/// Whether a significand can be held by a double without rounding.
pub(crate) fn fits_f64(significand: u64) -> bool {
    u64::BITS - significand.leading_zeros() <= F64_SIGNIFICAND_BITS
}

/// Assemble `±significand * 2^exponent`. The significand must satisfy
/// [`fits_f64`]. Results above the double range become infinity; results
/// below the normal range become (signed) zero.
pub(crate) fn build_f64(negative: bool, significand: u64, exponent: i32) -> f64 {
    let sign = u64::from(negative) << 63;
    if significand == 0 {
        return f64::from_bits(sign);
    }

    let width = i64::from(u64::BITS - significand.leading_zeros());
    let top = i64::from(exponent) + width - 1;
    let magnitude = if top > 1023 {
        0x7ff << 52
    } else if top < -1022 {
        0
    } else {
        let fraction = (significand << (53 - width)) & ((1 << 52) - 1);
        (((top + 1023) as u64) << 52) | fraction
    };
    f64::from_bits(sign | magnitude)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(n: Number) -> String {
        let mut out = Vec::new();
        n.encode(&mut out);
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn integers_pick_direct_form_below_eight_trailing_zeros() {
        assert_eq!(token(Number::from_u64(0xff)), "ff");
        assert_eq!(token(Number::from_u64(0x180)), "180");
        assert_eq!(token(Number::from_u64(0x100)), "1p8");
        assert_eq!(token(Number::from_u64(0x8000_0000)), "1p1f");
        assert_eq!(token(Number::from_i64(-0x7000_0000)), "-7p1c");
        assert_eq!(token(Number::from_i64(i64::MIN)), "-1p3f");
    }

    #[test]
    fn floats_share_the_integer_rules() {
        assert_eq!(Number::from_f64(128.0), Number::from_u64(128));
        assert_eq!(token(Number::from_f64(256.0)), "1p8");
        assert_eq!(token(Number::from_f64(0.5)), "1p-1");
        assert_eq!(token(Number::from_f64(f64::from_bits(1))), "0");
        assert_eq!(token(Number::from_f64(-0.0)), "0");
    }

    #[test]
    fn build_f64_is_exact_for_canonical_significands() {
        for v in [0.5, 1.0, 3.75, -1e300, 1e-300, f64::MAX, f64::MIN_POSITIVE] {
            match Number::from_f64(v) {
                Number::Finite {
                    negative,
                    significand,
                    exponent,
                } => assert_eq!(build_f64(negative, significand, exponent), v),
                other => panic!("expected finite decomposition, got {other:?}"),
            }
        }
    }

    #[test]
    fn build_f64_saturates_out_of_range_exponents() {
        assert_eq!(build_f64(false, 1, i32::MAX), f64::INFINITY);
        assert_eq!(build_f64(true, 1, i32::MAX), f64::NEG_INFINITY);
        assert_eq!(build_f64(false, 1, i32::MIN), 0.0);
        assert!(build_f64(true, 1, i32::MIN).is_sign_negative());
    }

    #[test]
    fn integral_magnitude_respects_u64_width() {
        assert_eq!(integral_magnitude(1, 63), Some(1 << 63));
        assert_eq!(integral_magnitude(3, 63), None);
        assert_eq!(integral_magnitude(1, -1), None);
    }
}
