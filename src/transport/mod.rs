//! Transport layer for the provider's token and revocation endpoints
//!
//! [`TokenEndpoint`] is the seam between the token manager and HTTP. The
//! manager never retries: retry and backoff, if any, belong to the
//! implementation. [`HttpTokenEndpoint`] is the `reqwest`-backed default.

pub mod http;

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;

pub use http::HttpTokenEndpoint;

/// Errors reported by a token endpoint implementation
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EndpointError {
    /// Request never produced an HTTP response (DNS, TLS, timeout, ...)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Provider answered with an OAuth error body
    #[error("Provider rejected request: {error}")]
    Rejected {
        /// OAuth error code (`invalid_grant`, ...)
        error: String,
        /// Optional `error_description`
        description: Option<String>,
    },

    /// Response body was not understood
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Authorization code grant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeExchangeRequest {
    /// Token endpoint URL
    pub token_endpoint: String,
    /// Authorization code from the callback
    pub code: String,
    /// PKCE code verifier
    pub code_verifier: String,
    /// Redirect URI used in the authorization request
    pub redirect_uri: String,
    /// OAuth client ID
    pub client_id: String,
}

impl CodeExchangeRequest {
    /// Form fields, in wire order
    #[must_use]
    pub fn form(&self) -> Vec<(&'static str, &str)> {
        vec![
            ("grant_type", "authorization_code"),
            ("code", self.code.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("client_id", self.client_id.as_str()),
            ("code_verifier", self.code_verifier.as_str()),
        ]
    }
}

/// Refresh token grant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshRequest {
    /// Token endpoint URL
    pub token_endpoint: String,
    /// Refresh token to redeem
    pub refresh_token: String,
    /// OAuth client ID
    pub client_id: String,
}

impl RefreshRequest {
    /// Form fields, in wire order
    #[must_use]
    pub fn form(&self) -> Vec<(&'static str, &str)> {
        vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", self.refresh_token.as_str()),
            ("client_id", self.client_id.as_str()),
        ]
    }
}

/// Which token a revocation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenTypeHint {
    /// `refresh_token`
    RefreshToken,
    /// `access_token`
    AccessToken,
}

impl TokenTypeHint {
    /// Wire value
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenTypeHint::RefreshToken => "refresh_token",
            TokenTypeHint::AccessToken => "access_token",
        }
    }
}

/// Token revocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevokeRequest {
    /// Revocation endpoint URL
    pub revocation_endpoint: String,
    /// Token to revoke
    pub token: String,
    /// Kind of `token`
    pub token_type_hint: TokenTypeHint,
    /// OAuth client ID
    pub client_id: String,
}

impl RevokeRequest {
    /// Form fields, in wire order
    #[must_use]
    pub fn form(&self) -> Vec<(&'static str, &str)> {
        vec![
            ("token", self.token.as_str()),
            ("token_type_hint", self.token_type_hint.as_str()),
            ("client_id", self.client_id.as_str()),
        ]
    }
}

/// Successful token endpoint response
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenResponse {
    /// Access token
    pub access_token: String,
    /// ID token; required for this client
    #[serde(default)]
    pub id_token: Option<String>,
    /// Refresh token, if issued (or rotated)
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Access token lifetime in seconds
    #[serde(default)]
    pub expires_in: Option<u64>,
    /// Token type (usually "Bearer")
    #[serde(default)]
    pub token_type: Option<String>,
    /// Granted scopes
    #[serde(default)]
    pub scope: Option<String>,
}

/// OAuth error body
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ErrorResponse {
    pub(crate) error: String,
    #[serde(default)]
    pub(crate) error_description: Option<String>,
}

impl From<ErrorResponse> for EndpointError {
    fn from(err: ErrorResponse) -> Self {
        EndpointError::Rejected {
            error: err.error,
            description: err.error_description,
        }
    }
}

/// Token endpoint client
///
/// Calls are driven to completion on a spawned task; an implementation is
/// never dropped mid-request by the manager.
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    /// Redeem an authorization code
    ///
    /// # Errors
    /// Returns an `EndpointError` if the call fails or is rejected.
    async fn exchange_code(&self, request: CodeExchangeRequest)
    -> Result<TokenResponse, EndpointError>;

    /// Redeem a refresh token
    ///
    /// # Errors
    /// Returns an `EndpointError` if the call fails or is rejected.
    async fn refresh(&self, request: RefreshRequest) -> Result<TokenResponse, EndpointError>;

    /// Revoke a token
    ///
    /// # Errors
    /// Returns an `EndpointError` if the call fails or is rejected.
    async fn revoke(&self, request: RevokeRequest) -> Result<(), EndpointError>;
}

#[async_trait]
impl<T: TokenEndpoint + ?Sized> TokenEndpoint for Arc<T> {
    async fn exchange_code(
        &self,
        request: CodeExchangeRequest,
    ) -> Result<TokenResponse, EndpointError> {
        (**self).exchange_code(request).await
    }

    async fn refresh(&self, request: RefreshRequest) -> Result<TokenResponse, EndpointError> {
        (**self).refresh(request).await
    }

    async fn revoke(&self, request: RevokeRequest) -> Result<(), EndpointError> {
        (**self).revoke(request).await
    }
}
