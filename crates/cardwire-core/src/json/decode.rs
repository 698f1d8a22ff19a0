//! JSON decoding
//!
//! Parses JSON text into an [`Object`]. Every number becomes a [`Value::Float`];
//! arrays specialize on the kind of their first element.

use serde_json::Value as Json;

use super::{Object, Value};
use crate::protocol::CardError;

/// Decode JSON text whose root must be an object
pub fn decode_object(text: &[u8]) -> Result<Object, CardError> {
    let root: Json = serde_json::from_slice(text).map_err(|e| CardError::Parse(e.to_string()))?;
    match root {
        Json::Object(map) => Ok(convert_map(map)),
        other => Err(CardError::Parse(format!(
            "expected a JSON object, found {}",
            json_kind(&other)
        ))),
    }
}

fn convert_map(map: serde_json::Map<String, Json>) -> Object {
    map.into_iter()
        .map(|(key, value)| (key, convert(value)))
        .collect()
}

fn convert(value: Json) -> Value {
    match value {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(b),
        // Integers lose their distinction from floats on the wire
        Json::Number(n) => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        Json::String(s) => Value::String(s),
        Json::Object(map) => Value::Object(convert_map(map)),
        Json::Array(items) => convert_array(items),
    }
}

/// Specialize on the first element; fall back to the untyped form when the
/// elements are not all of that kind.
fn convert_array(items: Vec<Json>) -> Value {
    let Some(first) = items.first() else {
        return Value::Array(Vec::new());
    };

    match first {
        Json::String(_) if items.iter().all(Json::is_string) => Value::StringArray(
            items
                .into_iter()
                .filter_map(|item| match item {
                    Json::String(s) => Some(s),
                    _ => None,
                })
                .collect(),
        ),
        Json::Number(_) if items.iter().all(Json::is_number) => {
            Value::FloatArray(items.iter().filter_map(Json::as_f64).collect())
        }
        Json::Object(_) if items.iter().all(Json::is_object) => Value::ObjectArray(
            items
                .into_iter()
                .filter_map(|item| match item {
                    Json::Object(map) => Some(convert_map(map)),
                    _ => None,
                })
                .collect(),
        ),
        _ => {
            tracing::trace!(len = items.len(), "decoding heterogeneous array as untyped");
            Value::Array(items.into_iter().map(convert).collect())
        }
    }
}

fn json_kind(value: &Json) -> &'static str {
    match value {
        Json::Null => "null",
        Json::Bool(_) => "bool",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_scalars() {
        let obj = decode_object(br#"{"a":null,"b":false,"c":12,"d":-1.25,"e":"hi"}"#).unwrap();
        assert_eq!(obj["a"], Value::Null);
        assert_eq!(obj["b"], Value::Bool(false));
        assert_eq!(obj["c"], Value::Float(12.0));
        assert_eq!(obj["d"], Value::Float(-1.25));
        assert_eq!(obj["e"], Value::from("hi"));
    }

    #[test]
    fn test_specialized_arrays() {
        let obj = decode_object(br#"{"s":["a","b"],"f":[1,2.5],"o":[{"x":1}],"e":[]}"#).unwrap();
        assert_eq!(obj["s"], Value::StringArray(vec!["a".into(), "b".into()]));
        assert_eq!(obj["f"], Value::FloatArray(vec![1.0, 2.5]));
        let mut inner = Object::new();
        inner.insert("x".into(), Value::Float(1.0));
        assert_eq!(obj["o"], Value::ObjectArray(vec![inner]));
        assert_eq!(obj["e"], Value::Array(vec![]));
    }

    #[test]
    fn test_heterogeneous_array_is_untyped() {
        let obj = decode_object(br#"{"m":[1,"two",null]}"#).unwrap();
        assert_eq!(
            obj["m"],
            Value::Array(vec![Value::Float(1.0), Value::from("two"), Value::Null])
        );

        let obj = decode_object(br#"{"b":[true,false]}"#).unwrap();
        assert_eq!(obj["b"], Value::Array(vec![Value::Bool(true), Value::Bool(false)]));
    }

    #[test]
    fn test_non_object_root_rejected() {
        let err = decode_object(b"[1,2]").unwrap_err();
        assert!(matches!(err, CardError::Parse(_)));
        assert!(err.to_string().contains("array"));
    }

    #[test]
    fn test_malformed_rejected() {
        assert!(matches!(decode_object(b"{\"a\":"), Err(CardError::Parse(_))));
        assert!(matches!(decode_object(b""), Err(CardError::Parse(_))));
    }

    #[test]
    fn test_trailing_newline_accepted() {
        let obj = decode_object(b"{\"err\":\"\"}\r\n").unwrap();
        assert_eq!(obj["err"], Value::from(""));
    }
}
