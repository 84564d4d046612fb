//! Claim values decoded from an identity token

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;

/// Claims of one decoded ID token, keyed by claim name
pub type ClaimMap = BTreeMap<String, ClaimValue>;

/// A single claim value
///
/// JSON numbers that fit in `i64` become `Integer`; every other number is a
/// `Number`.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimValue {
    /// JSON `null`
    Null,
    /// JSON boolean
    Bool(bool),
    /// Integral JSON number
    Integer(i64),
    /// Non-integral (or out of range) JSON number
    Number(f64),
    /// JSON string
    String(String),
    /// JSON array
    Array(Vec<ClaimValue>),
    /// JSON object
    Object(ClaimMap),
}

impl ClaimValue {
    /// Variant name, used in flag type mismatch reports
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ClaimValue::Null => "null",
            ClaimValue::Bool(_) => "boolean",
            ClaimValue::Integer(_) => "integer",
            ClaimValue::Number(_) => "number",
            ClaimValue::String(_) => "string",
            ClaimValue::Array(_) => "array",
            ClaimValue::Object(_) => "object",
        }
    }

    /// String payload, if this is a `String`
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ClaimValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Boolean payload, if this is a `Bool`
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ClaimValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer payload, if this is an `Integer`
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ClaimValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Any numeric payload as `f64`
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ClaimValue::Integer(i) => Some(*i as f64),
            ClaimValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Elements, if this is an `Array`
    #[must_use]
    pub fn as_array(&self) -> Option<&[ClaimValue]> {
        match self {
            ClaimValue::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Members, if this is an `Object`
    #[must_use]
    pub fn as_object(&self) -> Option<&ClaimMap> {
        match self {
            ClaimValue::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Strings of an array claim; non-string elements are skipped
    #[must_use]
    pub fn string_items(&self) -> Vec<String> {
        self.as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl From<serde_json::Value> for ClaimValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => ClaimValue::Null,
            Value::Bool(b) => ClaimValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => ClaimValue::Integer(i),
                None => ClaimValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => ClaimValue::String(s),
            Value::Array(items) => {
                ClaimValue::Array(items.into_iter().map(ClaimValue::from).collect())
            }
            Value::Object(map) => ClaimValue::Object(
                map.into_iter()
                    .map(|(k, v)| (k, ClaimValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<ClaimValue> for serde_json::Value {
    fn from(value: ClaimValue) -> Self {
        use serde_json::Value;
        match value {
            ClaimValue::Null => Value::Null,
            ClaimValue::Bool(b) => Value::Bool(b),
            ClaimValue::Integer(i) => Value::from(i),
            ClaimValue::Number(n) => {
                serde_json::Number::from_f64(n).map_or(Value::Null, Value::Number)
            }
            ClaimValue::String(s) => Value::String(s),
            ClaimValue::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            ClaimValue::Object(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<&str> for ClaimValue {
    fn from(s: &str) -> Self {
        ClaimValue::String(s.to_string())
    }
}

impl From<String> for ClaimValue {
    fn from(s: String) -> Self {
        ClaimValue::String(s)
    }
}

impl From<bool> for ClaimValue {
    fn from(b: bool) -> Self {
        ClaimValue::Bool(b)
    }
}

impl From<i64> for ClaimValue {
    fn from(i: i64) -> Self {
        ClaimValue::Integer(i)
    }
}

impl Serialize for ClaimValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serde_json::Value::from(self.clone()).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ClaimValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(ClaimValue::from)
    }
}
