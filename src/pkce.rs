//! PKCE proof material for one authorization attempt

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};

use crate::utils::{constant_time_eq, random_urlsafe};

/// The only challenge method sent
pub const CODE_CHALLENGE_METHOD: &str = "S256";

/// Code verifier, code challenge and state for one login attempt
///
/// Not `Clone` and not serializable. The code exchange takes it by value,
/// so each challenge serves exactly one attempt and never reaches storage.
pub struct PkceChallenge {
    code_verifier: String,
    code_challenge: String,
    state: String,
}

impl std::fmt::Debug for PkceChallenge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkceChallenge")
            .field("code_verifier", &"<redacted>")
            .field("code_challenge", &self.code_challenge)
            .field("state", &self.state)
            .finish()
    }
}

impl PkceChallenge {
    /// Generate a fresh challenge
    ///
    /// The verifier is 32 random bytes, base64url encoded (43 characters);
    /// the state is 24 random bytes (32 characters).
    #[must_use]
    pub fn generate() -> Self {
        let code_verifier = random_urlsafe::<32>();
        let code_challenge = Self::derive_challenge(&code_verifier);
        Self {
            code_verifier,
            code_challenge,
            state: random_urlsafe::<24>(),
        }
    }

    /// `BASE64URL(SHA256(verifier))`
    #[must_use]
    pub fn derive_challenge(code_verifier: &str) -> String {
        let hash = Sha256::digest(code_verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(hash)
    }

    /// Secret sent to the token endpoint
    #[must_use]
    pub fn code_verifier(&self) -> &str {
        &self.code_verifier
    }

    /// Digest sent to the authorization endpoint
    #[must_use]
    pub fn code_challenge(&self) -> &str {
        &self.code_challenge
    }

    /// Anti-CSRF nonce bound to this attempt
    #[must_use]
    pub fn state(&self) -> &str {
        &self.state
    }

    /// Constant-time comparison of a returned state against the expected one
    #[must_use]
    pub fn verify(returned_state: &str, expected: &str) -> bool {
        constant_time_eq(returned_state, expected)
    }

    /// Whether `returned_state` is this attempt's state
    #[must_use]
    pub fn verify_state(&self, returned_state: &str) -> bool {
        Self::verify(returned_state, &self.state)
    }
}
