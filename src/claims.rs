//! ID token decoding and claim validation

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use std::sync::Arc;

use crate::error::{AuthError, AuthResult, InvalidTokenReason};
use crate::types::{ClaimMap, ClaimValue, SessionConfig};
use crate::utils::unix_now;
use crate::verifier::SignatureVerifier;

/// Decodes ID tokens into claim maps and validates the standard claims
///
/// Checks run in a fixed order: structure, signature, `exp`, `nbf`, `iss`,
/// `aud`. The first failure wins.
#[derive(Clone)]
pub struct ClaimResolver {
    issuer: String,
    audiences: Vec<String>,
    leeway_secs: u64,
    verifier: Arc<dyn SignatureVerifier>,
}

impl std::fmt::Debug for ClaimResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaimResolver")
            .field("issuer", &self.issuer)
            .field("audiences", &self.audiences)
            .field("leeway_secs", &self.leeway_secs)
            .finish_non_exhaustive()
    }
}

impl ClaimResolver {
    /// Resolver expecting the issuer and audiences of `config`
    pub fn new(config: &SessionConfig, verifier: Arc<dyn SignatureVerifier>) -> Self {
        Self {
            issuer: config.issuer.trim_end_matches('/').to_string(),
            audiences: config.accepted_audiences(),
            leeway_secs: config.leeway_secs,
            verifier,
        }
    }

    /// Decode and fully validate an ID token
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidToken` with the reason of the first failed check.
    pub fn decode(&self, id_token: &str) -> AuthResult<ClaimMap> {
        self.decode_at(id_token, unix_now(), true)
    }

    /// Decode and validate everything except `exp`
    ///
    /// Used when restoring a persisted session whose ID token has lapsed but
    /// can still be refreshed.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidToken` for any failure other than expiry.
    pub fn decode_ignoring_expiry(&self, id_token: &str) -> AuthResult<ClaimMap> {
        self.decode_at(id_token, unix_now(), false)
    }

    fn decode_at(&self, id_token: &str, now: u64, check_expiry: bool) -> AuthResult<ClaimMap> {
        let claims = Self::parse_payload(id_token)?;

        if !self.verifier.verify(id_token) {
            return Err(AuthError::invalid_token(InvalidTokenReason::BadSignature));
        }

        let now = now as f64;
        let leeway = self.leeway_secs as f64;

        let exp = claims
            .get("exp")
            .and_then(ClaimValue::as_f64)
            .ok_or_else(|| AuthError::invalid_token(InvalidTokenReason::Malformed))?;
        if check_expiry && exp + leeway <= now {
            return Err(AuthError::invalid_token(InvalidTokenReason::Expired));
        }

        if let Some(nbf) = claims.get("nbf").and_then(ClaimValue::as_f64) {
            if nbf > now + leeway {
                return Err(AuthError::invalid_token(InvalidTokenReason::NotYetValid));
            }
        }

        let issuer_matches = claims
            .get("iss")
            .and_then(ClaimValue::as_str)
            .is_some_and(|iss| iss.trim_end_matches('/') == self.issuer);
        if !issuer_matches {
            return Err(AuthError::invalid_token(InvalidTokenReason::IssuerMismatch));
        }

        let accepted = |aud: &str| self.audiences.iter().any(|a| a == aud);
        let audience_matches = match claims.get("aud") {
            Some(ClaimValue::String(aud)) => accepted(aud.as_str()),
            Some(ClaimValue::Array(items)) => {
                items.iter().filter_map(ClaimValue::as_str).any(accepted)
            }
            _ => false,
        };
        if !audience_matches {
            return Err(AuthError::invalid_token(InvalidTokenReason::AudienceMismatch));
        }

        Ok(claims)
    }

    /// Split a compact JWS and decode its payload, without any validation
    ///
    /// # Errors
    ///
    /// Returns `InvalidToken { reason: Malformed }` unless the token has three
    /// segments and the payload is a base64url JSON object.
    pub fn parse_payload(token: &str) -> AuthResult<ClaimMap> {
        let malformed = || AuthError::invalid_token(InvalidTokenReason::Malformed);

        let mut parts = token.split('.');
        let (Some(_header), Some(payload), Some(_signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(malformed());
        };

        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|_| malformed())?;
        let value: serde_json::Value = serde_json::from_slice(&bytes).map_err(|_| malformed())?;

        match ClaimValue::from(value) {
            ClaimValue::Object(map) => Ok(map),
            _ => Err(malformed()),
        }
    }

    /// Exact-key lookup; absence is not an error
    #[must_use]
    pub fn claim<'a>(claims: &'a ClaimMap, key: &str) -> Option<&'a ClaimValue> {
        claims.get(key)
    }
}
