//! Conversions between [`Value`] and `serde_json::Value`.

use crate::error::CodecError;
use crate::value::{Map, Value};

impl Value {
    /// Render as JSON. Byte blobs become arrays of numbers; non-finite floats
    /// become strings; map keys that are not strings use their display form.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Bool(v) => serde_json::Value::Bool(*v),
            Value::Int(v) => serde_json::Value::from(*v),
            Value::Uint(v) => serde_json::Value::from(*v),
            Value::Float(v) => serde_json::Number::from_f64(*v)
                .map(serde_json::Value::Number)
                .unwrap_or_else(|| serde_json::Value::String(v.to_string())),
            Value::String(v) => serde_json::Value::String(v.clone()),
            Value::Bytes(v) => serde_json::Value::Array(v.iter().map(|b| (*b).into()).collect()),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Map(map) => {
                let mut object = serde_json::Map::with_capacity(map.len());
                for (k, v) in map.iter() {
                    let key = match k {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    object.insert(key, v.to_json());
                }
                serde_json::Value::Object(object)
            }
        }
    }
}

impl TryFrom<serde_json::Value> for Value {
    type Error = CodecError;

    /// JSON `null` has no wire form and yields `UnknownValueKind`.
    fn try_from(json: serde_json::Value) -> Result<Self, Self::Error> {
        match json {
            serde_json::Value::Null => Err(CodecError::UnknownValueKind("null".to_string())),
            serde_json::Value::Bool(v) => Ok(Value::Bool(v)),
            serde_json::Value::Number(n) => {
                if let Some(v) = n.as_u64() {
                    Ok(Value::Uint(v))
                } else if let Some(v) = n.as_i64() {
                    Ok(Value::Int(v))
                } else if let Some(v) = n.as_f64() {
                    Ok(Value::Float(v))
                } else {
                    Err(CodecError::UnknownValueKind(format!("number {n}")))
                }
            }
            serde_json::Value::String(v) => Ok(Value::String(v)),
            serde_json::Value::Array(items) => items
                .into_iter()
                .map(Value::try_from)
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            serde_json::Value::Object(object) => {
                let mut map = Map::with_capacity(object.len());
                for (k, v) in object {
                    map.insert(Value::String(k), Value::try_from(v)?);
                }
                Ok(Value::Map(map))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_roundtrip_for_plain_data() {
        let json = serde_json::json!({"cmd": "open", "flags": [1, -2, 0.5], "ok": true});
        let value = Value::try_from(json.clone()).unwrap();
        assert_eq!(value.to_json(), json);
    }

    #[test]
    fn null_is_unknown_kind() {
        let err = Value::try_from(serde_json::json!([1, null])).unwrap_err();
        assert_eq!(err, CodecError::UnknownValueKind("null".to_string()));
    }

    #[test]
    fn bytes_render_as_number_arrays() {
        let value = Value::from(&b"\x00\xff"[..]);
        assert_eq!(value.to_json(), serde_json::json!([0, 255]));
    }

    #[test]
    fn non_finite_floats_render_as_strings() {
        assert_eq!(Value::Float(f64::INFINITY).to_json(), serde_json::json!("inf"));
    }
}
