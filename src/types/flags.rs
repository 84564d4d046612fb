//! Feature flag types

use serde::{Deserialize, Serialize};

use super::claims::ClaimValue;

/// Declared type of a flag (`t` in the claim)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagType {
    /// `"b"`
    Boolean,
    /// `"s"`
    String,
    /// `"i"`
    Integer,
}

impl FlagType {
    /// Parse the single-letter wire code
    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "b" => Some(Self::Boolean),
            "s" => Some(Self::String),
            "i" => Some(Self::Integer),
            _ => None,
        }
    }

    /// Single-letter wire code
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Boolean => "b",
            Self::String => "s",
            Self::Integer => "i",
        }
    }

    /// Name used in error messages
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::String => "string",
            Self::Integer => "integer",
        }
    }
}

impl std::fmt::Display for FlagType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of a flag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlagValue {
    /// Boolean flag
    Bool(bool),
    /// Integer flag
    Integer(i64),
    /// String flag
    String(String),
    /// Any other claim value (untyped flags only)
    Other(ClaimValue),
}

impl FlagValue {
    /// Type of this payload; `None` for `Other`
    #[must_use]
    pub fn flag_type(&self) -> Option<FlagType> {
        match self {
            FlagValue::Bool(_) => Some(FlagType::Boolean),
            FlagValue::Integer(_) => Some(FlagType::Integer),
            FlagValue::String(_) => Some(FlagType::String),
            FlagValue::Other(_) => None,
        }
    }

    /// Type name reported in mismatches: the flag type, else the claim's kind
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            FlagValue::Other(value) => value.kind(),
            _ => self.flag_type().map_or("null", |t| t.as_str()),
        }
    }

    /// Boolean payload
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FlagValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer payload
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FlagValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// String payload
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FlagValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<ClaimValue> for FlagValue {
    fn from(value: ClaimValue) -> Self {
        match value {
            ClaimValue::Bool(b) => FlagValue::Bool(b),
            ClaimValue::Integer(i) => FlagValue::Integer(i),
            ClaimValue::String(s) => FlagValue::String(s),
            other => FlagValue::Other(other),
        }
    }
}

impl From<bool> for FlagValue {
    fn from(b: bool) -> Self {
        FlagValue::Bool(b)
    }
}

impl From<i64> for FlagValue {
    fn from(i: i64) -> Self {
        FlagValue::Integer(i)
    }
}

impl From<&str> for FlagValue {
    fn from(s: &str) -> Self {
        FlagValue::String(s.to_string())
    }
}

impl From<String> for FlagValue {
    fn from(s: String) -> Self {
        FlagValue::String(s)
    }
}

/// A resolved flag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flag {
    /// Flag code
    pub code: String,
    /// Declared type, or the default's own type when `is_default`
    pub flag_type: Option<FlagType>,
    /// Resolved payload
    pub value: FlagValue,
    /// True when the flag was absent and the caller's default was returned
    pub is_default: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_type_codes() {
        for t in [FlagType::Boolean, FlagType::String, FlagType::Integer] {
            assert_eq!(FlagType::from_code(t.code()), Some(t));
        }
        assert_eq!(FlagType::from_code("x"), None);
        assert_eq!(FlagType::from_code("B"), None);
    }

    #[test]
    fn test_flag_value_from_claim() {
        assert_eq!(FlagValue::from(ClaimValue::Bool(true)), FlagValue::Bool(true));
        assert_eq!(
            FlagValue::from(ClaimValue::Number(1.5)).flag_type(),
            None
        );
        assert_eq!(FlagValue::from("pink").flag_type(), Some(FlagType::String));
    }
}
