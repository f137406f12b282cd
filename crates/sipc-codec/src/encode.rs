//! Append-only encoder. Every `append_*` writes one space-prefixed token.

use bytes::BufMut;

use crate::hex::encode_hex;
use crate::number::Number;
use crate::value::Value;

pub fn append_bool<B: BufMut>(dst: &mut B, v: bool) {
    dst.put_slice(if v { b" T" } else { b" F" });
}

pub fn append_uint<B: BufMut>(dst: &mut B, v: u64) {
    dst.put_u8(b' ');
    Number::from_u64(v).encode(dst);
}

pub fn append_int<B: BufMut>(dst: &mut B, v: i64) {
    dst.put_u8(b' ');
    Number::from_i64(v).encode(dst);
}

/// Subnormals and both zeros are written as `0`.
pub fn append_float<B: BufMut>(dst: &mut B, v: f64) {
    dst.put_u8(b' ');
    Number::from_f64(v).encode(dst);
}

/// Length-prefixed: `<hexlen>:<raw utf-8>`.
pub fn append_str<B: BufMut>(dst: &mut B, v: &str) {
    append_blob(dst, b':', v.as_bytes());
}

/// Length-prefixed: `<hexlen>|<raw bytes>`.
pub fn append_bytes<B: BufMut>(dst: &mut B, v: &[u8]) {
    append_blob(dst, b'|', v);
}

fn append_blob<B: BufMut>(dst: &mut B, separator: u8, data: &[u8]) {
    dst.put_u8(b' ');
    encode_hex(dst, data.len() as u64);
    dst.put_u8(separator);
    dst.put_slice(data);
}

pub fn append_array_start<B: BufMut>(dst: &mut B) {
    dst.put_slice(b" [");
}

pub fn append_array_end<B: BufMut>(dst: &mut B) {
    dst.put_slice(b" ]");
}

pub fn append_map_start<B: BufMut>(dst: &mut B) {
    dst.put_slice(b" {");
}

pub fn append_map_end<B: BufMut>(dst: &mut B) {
    dst.put_slice(b" }");
}

/// Append any value. Map keys and values are interleaved in insertion order.
pub fn append_value<B: BufMut>(dst: &mut B, value: &Value) {
    match value {
        Value::Bool(v) => append_bool(dst, *v),
        Value::Int(v) => append_int(dst, *v),
        Value::Uint(v) => append_uint(dst, *v),
        Value::Float(v) => append_float(dst, *v),
        Value::String(v) => append_str(dst, v),
        Value::Bytes(v) => append_bytes(dst, v),
        Value::Array(items) => {
            append_array_start(dst);
            for item in items {
                append_value(dst, item);
            }
            append_array_end(dst);
        }
        Value::Map(map) => {
            append_map_start(dst);
            for (k, v) in map.iter() {
                append_value(dst, k);
                append_value(dst, v);
            }
            append_map_end(dst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(f: impl FnOnce(&mut Vec<u8>)) -> String {
        let mut out = Vec::new();
        f(&mut out);
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn scalar_tokens() {
        assert_eq!(encoded(|b| append_bool(b, true)), " T");
        assert_eq!(encoded(|b| append_bool(b, false)), " F");
        assert_eq!(encoded(|b| append_uint(b, 0)), " 0");
        assert_eq!(encoded(|b| append_uint(b, 0xff)), " ff");
        assert_eq!(encoded(|b| append_uint(b, 0x100)), " 1p8");
        assert_eq!(encoded(|b| append_uint(b, 0x180)), " 180");
        assert_eq!(encoded(|b| append_uint(b, 0x1000)), " 1pc");
        assert_eq!(encoded(|b| append_uint(b, 0x8000_0000)), " 1p1f");
        assert_eq!(encoded(|b| append_int(b, -0xff)), " -ff");
        assert_eq!(encoded(|b| append_int(b, -0x7000_0000)), " -7p1c");
        assert_eq!(encoded(|b| append_int(b, 0)), " 0");
    }

    #[test]
    fn float_tokens() {
        let x = f64::from(0x1abcd_u32) / f64::from(1u32 << 14);
        assert_eq!(encoded(|b| append_float(b, x)), " 1abcdp-e");
        assert_eq!(encoded(|b| append_float(b, f64::NAN)), " nan");
        assert_eq!(encoded(|b| append_float(b, f64::INFINITY)), " inf");
        assert_eq!(encoded(|b| append_float(b, f64::NEG_INFINITY)), " -inf");
        assert_eq!(encoded(|b| append_float(b, 0.0)), " 0");
        assert_eq!(encoded(|b| append_float(b, 128.0)), " 80");
        assert_eq!(encoded(|b| append_float(b, 256.0)), " 1p8");
        assert_eq!(
            encoded(|b| append_float(b, -f64::from_bits(1))),
            " 0",
            "subnormals collapse to zero"
        );
    }

    #[test]
    fn blob_tokens_are_length_prefixed() {
        assert_eq!(encoded(|b| append_str(b, "abc")), " 3:abc");
        assert_eq!(encoded(|b| append_bytes(b, b"123")), " 3|123");
        assert_eq!(encoded(|b| append_str(b, "")), " 0:");
        let long = "x".repeat(0x1f);
        assert_eq!(encoded(|b| append_str(b, &long)), format!(" 1f:{long}"));
    }

    #[test]
    fn containers_wrap_elements() {
        let mut map = crate::Map::new();
        map.insert("foo", "bar");
        let value = Value::Array(vec![1u64.into(), Value::Map(map), Value::Array(vec![])]);
        assert_eq!(
            encoded(|b| append_value(b, &value)),
            " [ 1 { 3:foo 3:bar } [ ] ]"
        );
    }
}
