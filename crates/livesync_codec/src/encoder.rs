//! JSON text encoder.

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::error::{CodecError, CodecResult};
use crate::value::Value;

/// Serialize a value to compact JSON text.
///
/// Map fields are written in their stored order. Non-finite floats are
/// written as `null`, matching `serde_json`.
///
/// # Errors
///
/// Returns an error if the underlying writer fails.
pub fn to_json(value: &Value) -> CodecResult<String> {
    serde_json::to_string(value).map_err(|e| CodecError::serialize(e.to_string()))
}

/// Serialize a value to indented JSON text, for display.
///
/// # Errors
///
/// Returns an error if the underlying writer fails.
pub fn to_json_pretty(value: &Value) -> CodecResult<String> {
    serde_json::to_string_pretty(value).map_err(|e| CodecError::serialize(e.to_string()))
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Integer(n) => serializer.serialize_i64(*n),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (key, value) in fields {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_scalars() {
        assert_eq!(to_json(&Value::Null).unwrap(), "null");
        assert_eq!(to_json(&Value::Bool(false)).unwrap(), "false");
        assert_eq!(to_json(&Value::Integer(-12)).unwrap(), "-12");
        assert_eq!(to_json(&Value::Float(0.25)).unwrap(), "0.25");
        assert_eq!(to_json(&Value::from("a\"b")).unwrap(), r#""a\"b""#);
    }

    #[test]
    fn non_finite_float_becomes_null() {
        assert_eq!(to_json(&Value::Float(f64::NAN)).unwrap(), "null");
    }

    #[test]
    fn encode_message_keeps_field_order() {
        let msg = Value::empty_map()
            .with("type", "observe")
            .with("what", Value::from(vec!["users", "online"]))
            .with("pushed", false);
        assert_eq!(
            to_json(&msg).unwrap(),
            r#"{"type":"observe","what":["users","online"],"pushed":false}"#
        );
    }

    #[test]
    fn pretty_output_is_parseable() {
        let msg = Value::empty_map().with("a", vec![1, 2]);
        let text = to_json_pretty(&msg).unwrap();
        assert!(text.contains('\n'));
        assert_eq!(crate::from_json(&text).unwrap(), msg);
    }
}
