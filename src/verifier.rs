//! JWT signature verification
//!
//! The claim resolver only needs a yes/no answer for "was this token signed
//! by a key we trust". [`SignatureVerifier`] is that seam; [`JwtKeyVerifier`]
//! answers it with `jsonwebtoken` against a fixed key set, typically loaded
//! from the provider's JWKS.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde::Deserialize;
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{AuthError, AuthResult};

/// Signature verification capability
pub trait SignatureVerifier: Send + Sync {
    /// Whether the compact JWS `token` carries a valid signature
    fn verify(&self, token: &str) -> bool;
}

impl<T: SignatureVerifier + ?Sized> SignatureVerifier for Arc<T> {
    fn verify(&self, token: &str) -> bool {
        (**self).verify(token)
    }
}

/// One trusted key
#[derive(Clone)]
struct VerificationKey {
    kid: Option<String>,
    algorithm: Algorithm,
    key: DecodingKey,
}

/// Verifies signatures against a set of trusted keys
///
/// A key is tried when its algorithm equals the token header's `alg` and,
/// if both sides carry a `kid`, the ids match.
#[derive(Clone, Default)]
pub struct JwtKeyVerifier {
    keys: Vec<VerificationKey>,
}

impl std::fmt::Debug for JwtKeyVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys: Vec<_> = self
            .keys
            .iter()
            .map(|k| (k.kid.as_deref(), k.algorithm))
            .collect();
        f.debug_struct("JwtKeyVerifier").field("keys", &keys).finish()
    }
}

/// JWKS document
#[derive(Debug, Deserialize)]
struct Jwks {
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    kty: String,
    #[serde(default)]
    kid: Option<String>,
    #[serde(default)]
    alg: Option<String>,
    #[serde(default, rename = "use")]
    use_: Option<String>,

    // RSA specific
    #[serde(default)]
    n: Option<String>,
    #[serde(default)]
    e: Option<String>,

    // EC specific
    #[serde(default)]
    x: Option<String>,
    #[serde(default)]
    y: Option<String>,

    // HMAC specific
    #[serde(default)]
    k: Option<String>,
}

impl JwtKeyVerifier {
    /// Empty verifier; rejects every token until a key is added
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Verifier for a single HMAC-SHA256 shared secret
    #[must_use]
    pub fn hs256(secret: &[u8]) -> Self {
        Self::new().with_key(None, Algorithm::HS256, DecodingKey::from_secret(secret))
    }

    /// Add a trusted key
    #[must_use]
    pub fn with_key(mut self, kid: Option<String>, algorithm: Algorithm, key: DecodingKey) -> Self {
        self.keys.push(VerificationKey {
            kid,
            algorithm,
            key,
        });
        self
    }

    /// Build from a JWKS JSON document
    ///
    /// Keys whose `use` is not `sig`, and key types other than RSA, EC and
    /// oct, are skipped.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidConfig` if the document does not parse, a
    /// key is missing its components, or no usable key remains.
    pub fn from_jwks(jwks_json: &str) -> AuthResult<Self> {
        let jwks: Jwks = serde_json::from_str(jwks_json)
            .map_err(|e| AuthError::invalid_config(format!("JWKS: {e}")))?;

        let mut verifier = Self::new();
        for jwk in jwks.keys {
            if jwk.use_.as_deref().is_some_and(|u| u != "sig") {
                continue;
            }
            let Some((algorithm, key)) = Self::decoding_key(&jwk)? else {
                tracing::debug!(kty = %jwk.kty, kid = ?jwk.kid, "Skipping unsupported JWK");
                continue;
            };
            verifier = verifier.with_key(jwk.kid, algorithm, key);
        }

        if verifier.keys.is_empty() {
            return Err(AuthError::invalid_config("JWKS contains no usable signing key"));
        }
        Ok(verifier)
    }

    fn decoding_key(jwk: &Jwk) -> AuthResult<Option<(Algorithm, DecodingKey)>> {
        let missing = |part: &str| AuthError::invalid_config(format!("JWK missing '{part}'"));
        let bad = |e: jsonwebtoken::errors::Error| AuthError::invalid_config(format!("JWK: {e}"));

        let declared = match jwk.alg.as_deref() {
            Some(alg) => Some(
                Algorithm::from_str(alg)
                    .map_err(|_| AuthError::invalid_config(format!("JWK alg '{alg}'")))?,
            ),
            None => None,
        };

        let pair = match jwk.kty.as_str() {
            "RSA" => {
                let n = jwk.n.as_deref().ok_or_else(|| missing("n"))?;
                let e = jwk.e.as_deref().ok_or_else(|| missing("e"))?;
                let key = DecodingKey::from_rsa_components(n, e).map_err(bad)?;
                Some((declared.unwrap_or(Algorithm::RS256), key))
            }
            "EC" => {
                let x = jwk.x.as_deref().ok_or_else(|| missing("x"))?;
                let y = jwk.y.as_deref().ok_or_else(|| missing("y"))?;
                let key = DecodingKey::from_ec_components(x, y).map_err(bad)?;
                Some((declared.unwrap_or(Algorithm::ES256), key))
            }
            "oct" => {
                let k = jwk.k.as_deref().ok_or_else(|| missing("k"))?;
                let secret = URL_SAFE_NO_PAD
                    .decode(k.trim_end_matches('='))
                    .map_err(|e| AuthError::invalid_config(format!("JWK k: {e}")))?;
                Some((
                    declared.unwrap_or(Algorithm::HS256),
                    DecodingKey::from_secret(&secret),
                ))
            }
            _ => None,
        };
        Ok(pair)
    }

    /// Number of trusted keys
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether no key is trusted
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl SignatureVerifier for JwtKeyVerifier {
    fn verify(&self, token: &str) -> bool {
        let Ok(header) = decode_header(token) else {
            return false;
        };

        // Signature only; time, issuer and audience are checked by the resolver
        let mut validation = Validation::new(header.alg);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims = HashSet::new();

        self.keys
            .iter()
            .filter(|k| k.algorithm == header.alg)
            .filter(|k| match (&k.kid, &header.kid) {
                (Some(ours), Some(theirs)) => ours == theirs,
                _ => true,
            })
            .any(|k| decode::<serde_json::Value>(token, &k.key, &validation).is_ok())
    }
}
