//! Feature flags carried in the ID token
//!
//! Flags live in the `feature_flags` claim, one entry per code:
//!
//! ```json
//! {"feature_flags": {"theme": {"t": "s", "v": "pink"}, "beta": {"t": "b", "v": true}}}
//! ```
//!
//! The value decides the flag's type. `t` is optional and only labels values
//! that are none of boolean, string or integer. A bare value in place of the
//! `{t, v}` object is read the same way.
//!
//! Lookups follow two independent rules:
//! - an absent flag returns the caller's default, or [`FlagError::NotFound`]
//!   when none was given;
//! - a present flag read through a typed accessor must have that type, or the
//!   call fails with [`FlagError::TypeMismatch`]. Defaults never hide this.

use crate::error::FlagError;
use crate::types::{ClaimMap, ClaimValue, Flag, FlagType, FlagValue};

/// Claim holding the flag map
pub const FLAGS_CLAIM: &str = "feature_flags";

/// Resolves flags from a claim map
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureFlagResolver;

impl FeatureFlagResolver {
    /// Create a resolver
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Untyped lookup; never reports a type mismatch
    ///
    /// # Errors
    ///
    /// `FlagError::NotFound` when the flag is absent and `default` is `None`.
    pub fn get_flag(
        &self,
        claims: &ClaimMap,
        code: &str,
        default: Option<FlagValue>,
    ) -> Result<Flag, FlagError> {
        match Self::lookup(claims, code) {
            Some(flag) => Ok(flag),
            None => Self::fallback(code, default),
        }
    }

    /// Boolean lookup
    ///
    /// # Errors
    ///
    /// `NotFound` when absent without a default, `TypeMismatch` when present
    /// with another type.
    pub fn get_boolean_flag(
        &self,
        claims: &ClaimMap,
        code: &str,
        default: Option<bool>,
    ) -> Result<bool, FlagError> {
        let flag = self.typed(claims, code, FlagType::Boolean, default.map(FlagValue::Bool))?;
        flag.value
            .as_bool()
            .ok_or_else(|| Self::mismatch(&flag, FlagType::Boolean))
    }

    /// String lookup
    ///
    /// # Errors
    ///
    /// `NotFound` when absent without a default, `TypeMismatch` when present
    /// with another type.
    pub fn get_string_flag(
        &self,
        claims: &ClaimMap,
        code: &str,
        default: Option<&str>,
    ) -> Result<String, FlagError> {
        let flag = self.typed(claims, code, FlagType::String, default.map(FlagValue::from))?;
        flag.value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Self::mismatch(&flag, FlagType::String))
    }

    /// Integer lookup
    ///
    /// # Errors
    ///
    /// `NotFound` when absent without a default, `TypeMismatch` when present
    /// with another type.
    pub fn get_integer_flag(
        &self,
        claims: &ClaimMap,
        code: &str,
        default: Option<i64>,
    ) -> Result<i64, FlagError> {
        let flag = self.typed(claims, code, FlagType::Integer, default.map(FlagValue::Integer))?;
        flag.value
            .as_i64()
            .ok_or_else(|| Self::mismatch(&flag, FlagType::Integer))
    }

    /// All flags present in the claims, by code
    #[must_use]
    pub fn flags(&self, claims: &ClaimMap) -> Vec<Flag> {
        Self::flag_map(claims)
            .map(|map| {
                map.keys()
                    .filter_map(|code| Self::lookup(claims, code))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn typed(
        &self,
        claims: &ClaimMap,
        code: &str,
        expected: FlagType,
        default: Option<FlagValue>,
    ) -> Result<Flag, FlagError> {
        let Some(flag) = Self::lookup(claims, code) else {
            return Self::fallback(code, default);
        };

        if flag.value.flag_type() != Some(expected) {
            return Err(Self::mismatch(&flag, expected));
        }
        Ok(flag)
    }

    fn fallback(code: &str, default: Option<FlagValue>) -> Result<Flag, FlagError> {
        let value = default.ok_or_else(|| FlagError::not_found(code))?;
        tracing::debug!(flag = code, "Flag absent, using default");
        Ok(Flag {
            code: code.to_string(),
            flag_type: value.flag_type(),
            value,
            is_default: true,
        })
    }

    fn mismatch(flag: &Flag, expected: FlagType) -> FlagError {
        FlagError::type_mismatch(&flag.code, expected.as_str(), flag.value.kind())
    }

    fn flag_map(claims: &ClaimMap) -> Option<&ClaimMap> {
        claims.get(FLAGS_CLAIM).and_then(ClaimValue::as_object)
    }

    fn lookup(claims: &ClaimMap, code: &str) -> Option<Flag> {
        let entry = Self::flag_map(claims)?.get(code)?;

        let (declared, raw) = match entry {
            ClaimValue::Object(fields) if fields.contains_key("v") => {
                let declared = fields
                    .get("t")
                    .and_then(ClaimValue::as_str)
                    .and_then(FlagType::from_code);
                (declared, fields.get("v").cloned().unwrap_or(ClaimValue::Null))
            }
            other => (None, other.clone()),
        };

        let value = FlagValue::from(raw);
        Some(Flag {
            code: code.to_string(),
            flag_type: value.flag_type().or(declared),
            value,
            is_default: false,
        })
    }
}
