//! Token set held for an authenticated session

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::utils::unix_now;

/// Seconds before `expires_at` at which the set counts as expired
pub const EXPIRY_BUFFER_SECS: u64 = 60;

/// Tokens returned by a successful code exchange or refresh
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    /// Access token presented to resource servers
    pub access_token: String,

    /// Signed identity token
    pub id_token: String,

    /// Refresh token for obtaining a new set without re-authentication
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Token type (usually "Bearer")
    #[serde(default = "default_token_type")]
    pub token_type: String,

    /// Scopes granted to this set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// Unix timestamp when the access token expires
    pub expires_at: u64,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

// Secrets stay out of logs.
impl std::fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"<redacted>")
            .field("id_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl TokenSet {
    /// Create a token set from a token endpoint response
    #[must_use]
    pub fn new(
        access_token: String,
        id_token: String,
        refresh_token: Option<String>,
        expires_in: u64,
        scope: Option<String>,
    ) -> Self {
        Self {
            access_token,
            id_token,
            refresh_token,
            token_type: default_token_type(),
            scope,
            expires_at: unix_now().saturating_add(expires_in),
        }
    }

    /// Check if the access token is expired (with 60 second buffer)
    #[must_use]
    pub fn is_expired(&self) -> bool {
        unix_now() + EXPIRY_BUFFER_SECS >= self.expires_at
    }

    /// Whether a refresh grant can be attempted
    #[must_use]
    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Get the Authorization header value
    #[must_use]
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }

    /// Get remaining validity duration, if any
    #[must_use]
    pub fn remaining_validity(&self) -> Option<Duration> {
        let now = unix_now();
        (self.expires_at > now).then(|| Duration::from_secs(self.expires_at - now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_set(expires_in: u64) -> TokenSet {
        TokenSet::new(
            "access123".to_string(),
            "id.token.sig".to_string(),
            Some("refresh456".to_string()),
            expires_in,
            Some("openid".to_string()),
        )
    }

    #[test]
    fn test_token_set_new() {
        let tokens = token_set(3600);
        assert_eq!(tokens.token_type, "Bearer");
        assert!(!tokens.is_expired());
        assert!(tokens.can_refresh());
        assert!(tokens.remaining_validity().is_some());
    }

    #[test]
    fn test_expiry_buffer() {
        // Inside the 60 second buffer counts as expired
        assert!(token_set(30).is_expired());

        let mut tokens = token_set(3600);
        tokens.expires_at = unix_now() - 100;
        assert!(tokens.is_expired());
        assert!(tokens.remaining_validity().is_none());
    }

    #[test]
    fn test_empty_refresh_token_is_not_refreshable() {
        let mut tokens = token_set(3600);
        tokens.refresh_token = Some(String::new());
        assert!(!tokens.can_refresh());
        tokens.refresh_token = None;
        assert!(!tokens.can_refresh());
    }

    #[test]
    fn test_authorization_header() {
        assert_eq!(token_set(10).authorization_header(), "Bearer access123");
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let debug = format!("{:?}", token_set(10));
        assert!(!debug.contains("access123"));
        assert!(!debug.contains("refresh456"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_serde_defaults_token_type() {
        let json = serde_json::json!({
            "access_token": "a",
            "id_token": "i",
            "expires_at": 42
        });
        let tokens: TokenSet = serde_json::from_value(json).unwrap();
        assert_eq!(tokens.token_type, "Bearer");
        assert!(tokens.refresh_token.is_none());
    }
}
