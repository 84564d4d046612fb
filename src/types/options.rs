//! Session configuration and per-request authorization options

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;
use url::Url;

use crate::error::{AuthError, AuthResult};

/// Scope requested when none is configured
pub const DEFAULT_SCOPE: &str = "offline openid email profile";

/// Key under which the serialized token set is stored
pub const DEFAULT_STORAGE_KEY: &str = "oidc_auth_session.token_set";

fn default_scope() -> String {
    DEFAULT_SCOPE.to_string()
}

fn default_storage_key() -> String {
    DEFAULT_STORAGE_KEY.to_string()
}

// ============================================================================
// Session Configuration
// ============================================================================

/// Immutable configuration injected into an [`AuthSession`](crate::AuthSession)
///
/// Nothing is read from the environment: build it in code, or deserialize it
/// from whatever file format the application uses.
///
/// ```
/// use oidc_auth_session::SessionConfig;
///
/// let config = SessionConfig::builder()
///     .issuer("https://my-business.example.com")
///     .client_id("my-client-id")
///     .redirect_uri("my-url-scheme://callback")
///     .post_logout_redirect_uri("my-url-scheme://callback")
///     .build();
///
/// assert_eq!(config.scope, "offline openid email profile");
/// assert_eq!(
///     config.token_endpoint(),
///     "https://my-business.example.com/oauth2/token"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TypedBuilder)]
#[builder(
    builder_method(doc = "Create a new builder for SessionConfig"),
    builder_type(doc = "Builder for SessionConfig", vis = "pub")
)]
pub struct SessionConfig {
    /// Issuer URL; must equal the ID token's `iss`
    #[builder(setter(into))]
    pub issuer: String,

    /// OAuth client ID
    #[builder(setter(into))]
    pub client_id: String,

    /// Redirect URI registered for the client
    #[builder(setter(into))]
    pub redirect_uri: String,

    /// Where the provider sends the user after logout
    #[builder(setter(into))]
    pub post_logout_redirect_uri: String,

    /// Space-separated scopes to request
    #[serde(default = "default_scope")]
    #[builder(default = default_scope(), setter(into))]
    pub scope: String,

    /// API audience requested for the access token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(strip_option, into))]
    pub audience: Option<String>,

    /// Authorization endpoint override (default `{issuer}/oauth2/auth`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(strip_option, into))]
    pub authorization_endpoint: Option<String>,

    /// Token endpoint override (default `{issuer}/oauth2/token`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(strip_option, into))]
    pub token_endpoint: Option<String>,

    /// Revocation endpoint override (default `{issuer}/oauth2/revoke`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(strip_option, into))]
    pub revocation_endpoint: Option<String>,

    /// Logout endpoint override (default `{issuer}/logout`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(strip_option, into))]
    pub logout_endpoint: Option<String>,

    /// Secure storage key for the token set
    #[serde(default = "default_storage_key")]
    #[builder(default = default_storage_key(), setter(into))]
    pub storage_key: String,

    /// Clock skew tolerated on `exp`/`nbf`, in seconds
    #[serde(default)]
    #[builder(default)]
    pub leeway_secs: u64,
}

impl SessionConfig {
    fn issuer_base(&self) -> &str {
        self.issuer.trim_end_matches('/')
    }

    /// Resolved authorization endpoint
    #[must_use]
    pub fn authorization_endpoint(&self) -> String {
        self.authorization_endpoint
            .clone()
            .unwrap_or_else(|| format!("{}/oauth2/auth", self.issuer_base()))
    }

    /// Resolved token endpoint
    #[must_use]
    pub fn token_endpoint(&self) -> String {
        self.token_endpoint
            .clone()
            .unwrap_or_else(|| format!("{}/oauth2/token", self.issuer_base()))
    }

    /// Resolved revocation endpoint
    #[must_use]
    pub fn revocation_endpoint(&self) -> String {
        self.revocation_endpoint
            .clone()
            .unwrap_or_else(|| format!("{}/oauth2/revoke", self.issuer_base()))
    }

    /// Resolved logout endpoint
    #[must_use]
    pub fn logout_endpoint(&self) -> String {
        self.logout_endpoint
            .clone()
            .unwrap_or_else(|| format!("{}/logout", self.issuer_base()))
    }

    /// Values accepted in the ID token's `aud`: the client ID, plus the
    /// configured audience if any
    #[must_use]
    pub fn accepted_audiences(&self) -> Vec<String> {
        std::iter::once(self.client_id.clone())
            .chain(self.audience.clone())
            .collect()
    }

    /// Check that required values are present and URLs parse
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidConfig` naming the first bad field.
    pub fn validate(&self) -> AuthResult<()> {
        if self.client_id.trim().is_empty() {
            return Err(AuthError::invalid_config("client_id is empty"));
        }
        if self.scope.split_whitespace().next().is_none() {
            return Err(AuthError::invalid_config("scope is empty"));
        }
        let urls = [
            ("issuer", self.issuer.clone()),
            ("redirect_uri", self.redirect_uri.clone()),
            ("post_logout_redirect_uri", self.post_logout_redirect_uri.clone()),
            ("authorization_endpoint", self.authorization_endpoint()),
            ("token_endpoint", self.token_endpoint()),
            ("revocation_endpoint", self.revocation_endpoint()),
            ("logout_endpoint", self.logout_endpoint()),
        ];
        for (field, value) in urls {
            Url::parse(&value)
                .map_err(|e| AuthError::invalid_config(format!("{field} '{value}': {e}")))?;
        }
        Ok(())
    }
}

// ============================================================================
// Authorization Request Options
// ============================================================================

/// `prompt` parameter sent to the authorization endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Prompt {
    /// Always show the login screen
    Login,
    /// Show the registration screen
    Create,
    /// Fail instead of showing any UI
    None,
}

impl Prompt {
    /// Wire value
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Prompt::Login => "login",
            Prompt::Create => "create",
            Prompt::None => "none",
        }
    }
}

/// Extra parameters for a single authorization request
#[derive(Debug, Clone, Default, PartialEq, Eq, TypedBuilder)]
#[builder(
    builder_method(doc = "Create a new builder for AuthRequestOptions"),
    builder_type(doc = "Builder for AuthRequestOptions", vis = "pub")
)]
pub struct AuthRequestOptions {
    /// Prompt behaviour
    #[builder(default, setter(strip_option))]
    pub prompt: Option<Prompt>,

    /// Sign in to a specific organization
    #[builder(default, setter(strip_option, into))]
    pub org_code: Option<String>,

    /// Name of the organization to create
    #[builder(default, setter(strip_option, into))]
    pub org_name: Option<String>,

    /// Ask the provider to create a new organization
    #[builder(default)]
    pub is_create_org: bool,

    /// Pre-fill the login identifier
    #[builder(default, setter(strip_option, into))]
    pub login_hint: Option<String>,
}

impl AuthRequestOptions {
    /// Options for the registration screen
    #[must_use]
    pub fn register() -> Self {
        Self {
            prompt: Some(Prompt::Create),
            ..Self::default()
        }
    }

    /// Options for registering with a new organization
    pub fn create_org(org_name: impl Into<String>) -> Self {
        Self {
            prompt: Some(Prompt::Create),
            org_name: Some(org_name.into()),
            is_create_org: true,
            ..Self::default()
        }
    }

    /// Query parameters contributed by these options
    pub(crate) fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(prompt) = self.prompt {
            pairs.push(("prompt", prompt.as_str().to_string()));
        }
        if let Some(org_code) = &self.org_code {
            pairs.push(("org_code", org_code.clone()));
        }
        if let Some(org_name) = &self.org_name {
            pairs.push(("org_name", org_name.clone()));
        }
        if self.is_create_org {
            pairs.push(("is_create_org", "true".to_string()));
        }
        if let Some(login_hint) = &self.login_hint {
            pairs.push(("login_hint", login_hint.clone()));
        }
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SessionConfig {
        SessionConfig::builder()
            .issuer("https://my-business.example.com/")
            .client_id("my-client-id")
            .redirect_uri("my-url-scheme://callback")
            .post_logout_redirect_uri("my-url-scheme://callback")
            .build()
    }

    #[test]
    fn test_default_endpoints_strip_trailing_slash() {
        let config = config();
        assert_eq!(
            config.authorization_endpoint(),
            "https://my-business.example.com/oauth2/auth"
        );
        assert_eq!(
            config.revocation_endpoint(),
            "https://my-business.example.com/oauth2/revoke"
        );
        assert_eq!(config.logout_endpoint(), "https://my-business.example.com/logout");
    }

    #[test]
    fn test_endpoint_override() {
        let config = SessionConfig::builder()
            .issuer("https://idp.example.com")
            .client_id("c")
            .redirect_uri("app://cb")
            .post_logout_redirect_uri("app://cb")
            .token_endpoint("https://idp.example.com/token")
            .build();
        assert_eq!(config.token_endpoint(), "https://idp.example.com/token");
    }

    #[test]
    fn test_accepted_audiences_always_include_client_id() {
        let mut config = config();
        assert_eq!(config.accepted_audiences(), vec!["my-client-id"]);
        config.audience = Some("api".to_string());
        assert_eq!(config.accepted_audiences(), vec!["my-client-id", "api"]);
    }

    #[test]
    fn test_validate() {
        assert!(config().validate().is_ok());

        let mut bad = config();
        bad.issuer = "not a url".to_string();
        assert!(matches!(bad.validate(), Err(AuthError::InvalidConfig(_))));

        let mut bad = config();
        bad.client_id = " ".to_string();
        assert!(matches!(bad.validate(), Err(AuthError::InvalidConfig(_))));
    }

    #[test]
    fn test_deserialize_applies_defaults() {
        let json = serde_json::json!({
            "issuer": "https://idp.example.com",
            "client_id": "c",
            "redirect_uri": "app://cb",
            "post_logout_redirect_uri": "app://cb"
        });
        let config: SessionConfig = serde_json::from_value(json).unwrap();
        assert_eq!(config.scope, DEFAULT_SCOPE);
        assert_eq!(config.storage_key, DEFAULT_STORAGE_KEY);
        assert_eq!(config.leeway_secs, 0);
        assert!(config.audience.is_none());
    }

    #[test]
    fn test_create_org_query_pairs() {
        let pairs = AuthRequestOptions::create_org("Acme").query_pairs();
        assert_eq!(
            pairs,
            vec![
                ("prompt", "create".to_string()),
                ("org_name", "Acme".to_string()),
                ("is_create_org", "true".to_string()),
            ]
        );
    }
}
