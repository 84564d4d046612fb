//! User-agent seam for the authorization redirect
//!
//! The session never renders UI. It hands the authorization URL to a
//! [`UserAgent`] and waits for the URL the provider redirected back to.
//!
//! # Example: Implementing `UserAgent`
//!
//! ```no_run
//! use oidc_auth_session::callbacks::UserAgent;
//! use oidc_auth_session::AuthResult;
//! use async_trait::async_trait;
//! use url::Url;
//!
//! struct WebView;
//!
//! #[async_trait]
//! impl UserAgent for WebView {
//!     async fn present(&self, authorization_url: Url) -> AuthResult<Url> {
//!         // Load the page, intercept the redirect to the callback scheme
//!         # let _ = authorization_url;
//!         # unimplemented!()
//!     }
//! }
//! ```

use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use url::Url;

use crate::error::{AuthError, AuthResult};

// ============================================================================
// User Agent Trait
// ============================================================================

/// Presents the authorization URL and returns the redirect callback URL
#[async_trait]
pub trait UserAgent: Send + Sync {
    /// Show `authorization_url` to the user and resolve with the callback URL
    ///
    /// # Errors
    ///
    /// Return `AuthError::Cancelled` if the user aborts.
    async fn present(&self, authorization_url: Url) -> AuthResult<Url>;
}

#[async_trait]
impl<T: UserAgent + ?Sized> UserAgent for Arc<T> {
    async fn present(&self, authorization_url: Url) -> AuthResult<Url> {
        (**self).present(authorization_url).await
    }
}

#[async_trait]
impl UserAgent for Box<dyn UserAgent> {
    async fn present(&self, authorization_url: Url) -> AuthResult<Url> {
        (**self).present(authorization_url).await
    }
}

// ============================================================================
// Closure-based user agent
// ============================================================================

/// Wraps an async closure as a [`UserAgent`]
///
/// ```
/// use oidc_auth_session::callbacks::FnUserAgent;
///
/// let agent = FnUserAgent::new(|url| {
///     Box::pin(async move {
///         let state = url
///             .query_pairs()
///             .find(|(k, _)| k == "state")
///             .map(|(_, v)| v.into_owned())
///             .unwrap_or_default();
///         Ok(url::Url::parse(&format!("app://callback?code=abc&state={state}")).unwrap())
///     })
/// });
/// # let _ = agent;
/// ```
pub struct FnUserAgent<F>
where
    F: Fn(Url) -> std::pin::Pin<Box<dyn std::future::Future<Output = AuthResult<Url>> + Send>>
        + Send
        + Sync,
{
    func: F,
}

impl<F> FnUserAgent<F>
where
    F: Fn(Url) -> std::pin::Pin<Box<dyn std::future::Future<Output = AuthResult<Url>> + Send>>
        + Send
        + Sync,
{
    /// Wrap `func`
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F> UserAgent for FnUserAgent<F>
where
    F: Fn(Url) -> std::pin::Pin<Box<dyn std::future::Future<Output = AuthResult<Url>> + Send>>
        + Send
        + Sync,
{
    async fn present(&self, authorization_url: Url) -> AuthResult<Url> {
        (self.func)(authorization_url).await
    }
}

// ============================================================================
// Callback parameters
// ============================================================================

/// `code` and `state` carried back on the redirect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackParams {
    /// Authorization code
    pub code: String,
    /// State echoed by the provider
    pub state: String,
}

impl CallbackParams {
    /// Extract the parameters from a redirect URL
    ///
    /// # Errors
    ///
    /// - `AuthError::AuthorizationDenied` when the provider sent `error=...`
    /// - `AuthError::StateMismatch` when `state` is missing
    /// - `AuthError::InvalidResponse` when `code` is missing or empty
    pub fn from_url(callback: &Url) -> AuthResult<Self> {
        let mut code = None;
        let mut state = None;
        let mut error = None;
        let mut description = None;
        for (key, value) in callback.query_pairs() {
            match key.as_ref() {
                "code" => code = Some(value.into_owned()),
                "state" => state = Some(value.into_owned()),
                "error" => error = Some(value.into_owned()),
                "error_description" => description = Some(value.into_owned()),
                _ => {}
            }
        }

        if let Some(error) = error {
            return Err(AuthError::AuthorizationDenied { error, description });
        }
        let state = state.ok_or(AuthError::StateMismatch)?;
        let code = code
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AuthError::invalid_response("callback has no authorization code"))?;
        Ok(Self { code, state })
    }
}

// ============================================================================
// System browser
// ============================================================================

/// Opens the system browser and reads the redirected URL from stdin
///
/// For command-line tools whose redirect URI lands on a page showing the
/// final URL. Typing `cancel` (or an empty line) cancels.
#[derive(Debug, Clone)]
pub struct BrowserUserAgent {
    auto_open_browser: bool,
    opener: fn(&str) -> std::io::Result<()>,
}

impl Default for BrowserUserAgent {
    fn default() -> Self {
        Self::new()
    }
}

impl BrowserUserAgent {
    /// Create an agent that opens the browser automatically
    #[must_use]
    pub fn new() -> Self {
        Self {
            auto_open_browser: true,
            opener: webbrowser::open,
        }
    }

    /// Set whether to automatically open browser (default: true)
    #[must_use]
    pub fn auto_open_browser(mut self, auto_open: bool) -> Self {
        self.auto_open_browser = auto_open;
        self
    }

    /// Hand the whole URL to the platform browser launcher
    fn open_browser(&self, url: &Url) -> std::io::Result<()> {
        (self.opener)(url.as_str())
    }
}

#[async_trait]
impl UserAgent for BrowserUserAgent {
    async fn present(&self, authorization_url: Url) -> AuthResult<Url> {
        println!("Open this URL to sign in:");
        println!("  {authorization_url}");

        if self.auto_open_browser {
            if let Err(e) = self.open_browser(&authorization_url) {
                tracing::debug!("Could not open browser: {e}");
                println!("(Could not open browser automatically - please open the URL manually)");
            }
        }

        println!();
        println!("Paste the URL you were redirected to (or 'cancel' to abort):");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let line = lines
            .next_line()
            .await
            .map_err(|e| AuthError::invalid_response(format!("stdin: {e}")))?
            .unwrap_or_default();
        let input = line.trim();

        if input.is_empty() || input.eq_ignore_ascii_case("cancel") {
            return Err(AuthError::Cancelled);
        }
        Url::parse(input).map_err(|e| AuthError::invalid_response(format!("callback URL: {e}")))
    }
}
