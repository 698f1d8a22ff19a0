//! Value model
//!
//! The closed set of JSON shapes exchanged with the card.

use std::collections::BTreeMap;

/// A JSON object: string keys mapped to values
pub type Object = BTreeMap<String, Value>;

/// A JSON value as understood by the card codec
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// JSON `null`
    Null,
    /// JSON `true` / `false`
    Bool(bool),
    /// Any integer width supplied by the caller
    Int(i64),
    /// Double precision number (every number decoded from the wire)
    Float(f64),
    /// UTF-8 string
    String(String),
    /// Nested object
    Object(Object),
    /// Array of strings
    StringArray(Vec<String>),
    /// Array of numbers
    FloatArray(Vec<f64>),
    /// Array of objects
    ObjectArray(Vec<Object>),
    /// Untyped array, used when elements are not of one specialized kind
    Array(Vec<Value>),
}

impl Value {
    /// Get as string slice
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as f64; integers are widened
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Get as bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Get as nested object
    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Whether this is JSON `null`
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

macro_rules! int_from {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Value::Int(i64::from(v))
                }
            }
        )*
    };
}

int_from!(i8, i16, i32, i64, u8, u16, u32);

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(f64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Object> for Value {
    fn from(v: Object) -> Self {
        Value::Object(v)
    }
}

impl From<Vec<String>> for Value {
    fn from(v: Vec<String>) -> Self {
        Value::StringArray(v)
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Value::FloatArray(v)
    }
}

impl From<Vec<Object>> for Value {
    fn from(v: Vec<Object>) -> Self {
        Value::ObjectArray(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Create a request that expects a response, e.g. `{"req":"card.version"}`
pub fn new_request(name: &str) -> Object {
    let mut req = Object::new();
    req.insert("req".to_string(), Value::from(name));
    req
}

/// Create a command; the card sends no response to it
pub fn new_command(name: &str) -> Object {
    let mut cmd = Object::new();
    cmd.insert("cmd".to_string(), Value::from(name));
    cmd
}

/// Create an empty body object
pub fn new_body() -> Object {
    Object::new()
}

/// Read a string field, treating absence and non-strings as empty
pub(crate) fn str_field<'a>(object: &'a Object, key: &str) -> &'a str {
    object.get(key).and_then(Value::as_str).unwrap_or("")
}
