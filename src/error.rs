//! Error types for the auth session

use thiserror::Error;

/// Why an ID token was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidTokenReason {
    /// Not a three-part compact JWS, payload not a JSON object, or `exp` missing
    Malformed,
    /// `exp` is in the past
    Expired,
    /// `nbf` is in the future
    NotYetValid,
    /// Signature did not verify against the configured key
    BadSignature,
    /// `iss` differs from the configured issuer
    IssuerMismatch,
    /// `aud` contains neither the client ID nor the configured audience
    AudienceMismatch,
}

impl std::fmt::Display for InvalidTokenReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Malformed => "malformed",
            Self::Expired => "expired",
            Self::NotYetValid => "not yet valid",
            Self::BadSignature => "bad signature",
            Self::IssuerMismatch => "issuer mismatch",
            Self::AudienceMismatch => "audience mismatch",
        };
        f.write_str(s)
    }
}

/// Main error type for authentication operations
///
/// A shared refresh hands a clone of its error to every waiting caller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AuthError {
    /// Callback `state` does not match the outstanding PKCE challenge
    #[error("State mismatch: callback state does not match the login attempt")]
    StateMismatch,

    /// ID token failed validation
    #[error("Invalid token: {reason}")]
    InvalidToken {
        /// Which check failed
        reason: InvalidTokenReason,
    },

    /// Transport failure talking to the provider
    #[error("Network error: {0}")]
    Network(String),

    /// Refresh token is invalid, expired or revoked
    #[error("Session expired. Log in again.")]
    SessionExpired,

    /// No token set is installed
    #[error("Not authenticated. Call login() first.")]
    NotAuthenticated,

    /// Login was cancelled before the callback arrived
    #[error("Authentication cancelled")]
    Cancelled,

    /// Another login is already waiting for its callback
    #[error("A login attempt is already in progress")]
    LoginInProgress,

    /// Provider redirected back with `error=...`
    #[error("Authorization denied: {error}{}", describe(.description))]
    AuthorizationDenied {
        /// OAuth error code
        error: String,
        /// Optional human-readable description
        description: Option<String>,
    },

    /// Token endpoint rejected the code exchange
    #[error("Token exchange rejected: {error}{}", describe(.description))]
    TokenRejected {
        /// OAuth error code
        error: String,
        /// Optional human-readable description
        description: Option<String>,
    },

    /// Response from the provider could not be understood
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Secure storage failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

fn describe(description: &Option<String>) -> String {
    description
        .as_deref()
        .map(|d| format!(" ({d})"))
        .unwrap_or_default()
}

/// Result type alias for auth operations
pub type AuthResult<T> = std::result::Result<T, AuthError>;

impl AuthError {
    /// Create an invalid token error
    #[must_use]
    pub fn invalid_token(reason: InvalidTokenReason) -> Self {
        Self::InvalidToken { reason }
    }

    /// Create a network error
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Create an invalid response error
    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create an invalid configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// The validation failure reason, if this is an `InvalidToken` error
    #[must_use]
    pub fn invalid_token_reason(&self) -> Option<InvalidTokenReason> {
        match self {
            Self::InvalidToken { reason } => Some(*reason),
            _ => None,
        }
    }
}

/// Errors from feature flag lookups
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlagError {
    /// Flag absent and no default supplied
    #[error("Flag not found: {0}")]
    NotFound(String),

    /// Flag present with a different type than requested
    #[error("Flag '{code}' has type {actual}, expected {expected}")]
    TypeMismatch {
        /// Flag code
        code: String,
        /// Type the accessor asked for
        expected: String,
        /// Type found in the claim
        actual: String,
    },
}

impl FlagError {
    /// Create a not found error
    pub fn not_found(code: impl Into<String>) -> Self {
        Self::NotFound(code.into())
    }

    /// Create a type mismatch error
    pub fn type_mismatch(
        code: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::TypeMismatch {
            code: code.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}
