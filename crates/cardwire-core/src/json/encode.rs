//! JSON encoding
//!
//! Serializes an [`Object`] into compact JSON text, one arm per [`Value`] variant.

use std::io::Write;

use super::{Object, Value};
use crate::protocol::CardError;

/// Encode an object as compact JSON
pub fn encode_object(object: &Object) -> Result<Vec<u8>, CardError> {
    let mut out = Vec::with_capacity(64);
    write_object(&mut out, object)?;
    Ok(out)
}

/// Encode an object as a JSON string
pub fn encode_object_string(object: &Object) -> Result<String, CardError> {
    let bytes = encode_object(object)?;
    String::from_utf8(bytes).map_err(|e| CardError::Encode(e.to_string()))
}

fn write_object(out: &mut Vec<u8>, object: &Object) -> Result<(), CardError> {
    out.push(b'{');
    for (i, (key, value)) in object.iter().enumerate() {
        if i > 0 {
            out.push(b',');
        }
        write_string(out, key)?;
        out.push(b':');
        write_value(out, key, value)?;
    }
    out.push(b'}');
    Ok(())
}

fn write_value(out: &mut Vec<u8>, key: &str, value: &Value) -> Result<(), CardError> {
    match value {
        Value::Null => out.extend_from_slice(b"null"),
        Value::Bool(true) => out.extend_from_slice(b"true"),
        Value::Bool(false) => out.extend_from_slice(b"false"),
        Value::Int(v) => write_raw(out, format_args!("{v}"))?,
        Value::Float(v) => write_float(out, key, *v)?,
        Value::String(s) => write_string(out, s)?,
        Value::Object(o) => write_object(out, o)?,
        Value::StringArray(items) => write_array(out, items, |out, s| write_string(out, s))?,
        Value::FloatArray(items) => write_array(out, items, |out, v| write_float(out, key, *v))?,
        Value::ObjectArray(items) => write_array(out, items, write_object)?,
        Value::Array(items) => write_array(out, items, |out, v| write_value(out, key, v))?,
    }
    Ok(())
}

fn write_array<T>(
    out: &mut Vec<u8>,
    items: &[T],
    mut write_item: impl FnMut(&mut Vec<u8>, &T) -> Result<(), CardError>,
) -> Result<(), CardError> {
    out.push(b'[');
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push(b',');
        }
        write_item(out, item)?;
    }
    out.push(b']');
    Ok(())
}

/// Shortest round-trip decimal, never in exponent form
fn write_float(out: &mut Vec<u8>, key: &str, v: f64) -> Result<(), CardError> {
    if !v.is_finite() {
        return Err(CardError::Encode(format!(
            "field '{key}' holds {v}, which has no JSON representation"
        )));
    }
    write_raw(out, format_args!("{v}"))
}

fn write_string(out: &mut Vec<u8>, s: &str) -> Result<(), CardError> {
    serde_json::to_writer(&mut *out, s).map_err(|e| CardError::Encode(e.to_string()))
}

fn write_raw(out: &mut Vec<u8>, args: std::fmt::Arguments<'_>) -> Result<(), CardError> {
    out.write_fmt(args)
        .map_err(|e| CardError::Encode(e.to_string()))
}
