use std::fmt;

use serde::{Deserialize, Serialize};

/// An attribute value.
///
/// Values are dynamically typed: scalars (strings, booleans, integers, doubles, raw bytes) as well as nested arrays and
/// key/value lists.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub enum AnyValue {
    /// No value.
    #[default]
    Empty,

    /// A string.
    Str(String),

    /// A boolean.
    Bool(bool),

    /// A signed 64-bit integer.
    Int(i64),

    /// A 64-bit floating-point number.
    Double(f64),

    /// Raw bytes.
    Bytes(Vec<u8>),

    /// An ordered list of values.
    Array(Vec<AnyValue>),

    /// A nested list of key/value pairs.
    KvList(Vec<KeyValue>),
}

impl AnyValue {
    /// Returns the name of the value type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Str(_) => "str",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Double(_) => "double",
            Self::Bytes(_) => "bytes",
            Self::Array(_) => "array",
            Self::KvList(_) => "kvlist",
        }
    }
}

impl From<&str> for AnyValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for AnyValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<bool> for AnyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for AnyValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for AnyValue {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl fmt::Display for AnyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "<empty>"),
            Self::Str(s) => write!(f, "{}", s),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Double(d) => write!(f, "{}", d),
            Self::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Self::Array(values) => write!(f, "array<{}>", values.len()),
            Self::KvList(kvs) => write!(f, "kvlist<{}>", kvs.len()),
        }
    }
}

/// A key/value pair.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct KeyValue {
    /// Attribute key.
    pub key: String,

    /// Attribute value.
    pub value: AnyValue,
}

impl KeyValue {
    /// Creates a new `KeyValue` from the given key and value.
    pub fn new<K, V>(key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<AnyValue>,
    {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A set of attributes.
///
/// Order is preserved as given, and duplicate keys are not collapsed.
pub type Attributes = Vec<KeyValue>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_value_conversions() {
        assert_eq!(KeyValue::new("a", "b").value, AnyValue::Str("b".into()));
        assert_eq!(KeyValue::new("a", 42i64).value, AnyValue::Int(42));
        assert_eq!(KeyValue::new("a", true).value, AnyValue::Bool(true));
        assert_eq!(KeyValue::new("a", 1.5f64).value, AnyValue::Double(1.5));
    }

    #[test]
    fn nested_values_survive_json() {
        let value = AnyValue::KvList(vec![
            KeyValue::new("list", AnyValue::Array(vec![AnyValue::Int(1), AnyValue::Str("two".into())])),
            KeyValue::new("bytes", AnyValue::Bytes(vec![0, 1, 255])),
            KeyValue::new("empty", AnyValue::Empty),
        ]);

        let encoded = serde_json::to_string(&value).unwrap();
        let decoded: AnyValue = serde_json::from_str(&encoded).unwrap();
        assert_eq!(value, decoded);
    }
}
