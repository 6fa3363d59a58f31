use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A small tagged value used for event payloads and service RPC parameters
/// and results. The source uses a type-erased holder; per the "Payload-by-
/// dynamic-type" redesign note this is modeled explicitly as a closed
/// variant instead. On the wire (see `hive-net`'s message framing) every
/// variant is bridged to a JSON string, since the wire format is a flat
/// string attribute map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    String(String),
    Blob(Vec<u8>),
}

impl Value {
    /// Renders the value as the plain string the wire attribute map stores.
    pub fn to_attribute_string(&self) -> String {
        use base64::Engine;
        match self {
            Value::Int(v) => v.to_string(),
            Value::Float(v) => v.to_string(),
            Value::Bool(v) => v.to_string(),
            Value::String(v) => v.clone(),
            Value::Blob(bytes) => base64::engine::general_purpose::STANDARD.encode(bytes),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_attribute_string())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

/// A payload map, as carried by events and (before prefix-encoding) service
/// requests/responses.
pub type ValueMap = HashMap<String, Value>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_string_round_trips_primitives() {
        assert_eq!(Value::Int(42).to_attribute_string(), "42");
        assert_eq!(Value::Bool(true).to_attribute_string(), "true");
        assert_eq!(Value::String("hi".into()).to_attribute_string(), "hi");
    }

    #[test]
    fn blob_base64_has_expected_length_class() {
        let encoded = Value::Blob(vec![1, 2, 3]).to_attribute_string();
        assert_eq!(encoded.len(), 4);
    }
}
