//! Session façade
//!
//! [`AuthSession`] ties the pieces together: it builds the authorization
//! request, hands it to a [`UserAgent`], redeems the callback through the
//! [`TokenManager`] and answers identity and flag queries from the claims of
//! the installed ID token.
//!
//! # Example
//!
//! ```no_run
//! use oidc_auth_session::{
//!     AuthSession, BrowserUserAgent, FileStorage, HttpTokenEndpoint, JwtKeyVerifier,
//!     SessionConfig,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SessionConfig::builder()
//!     .issuer("https://my-business.kinde.com")
//!     .client_id("my-client-id")
//!     .redirect_uri("my-url-scheme://kinde_callback")
//!     .post_logout_redirect_uri("my-url-scheme://kinde_callback")
//!     .build();
//!
//! let jwks = std::fs::read_to_string("jwks.json")?;
//! let session = AuthSession::new(
//!     config,
//!     Arc::new(HttpTokenEndpoint::new()),
//!     Arc::new(FileStorage::new()),
//!     Arc::new(JwtKeyVerifier::from_jwks(&jwks)?),
//! )?;
//!
//! if !session.is_authorized() {
//!     session.login(&BrowserUserAgent::new()).await?;
//! }
//! if let Some(user) = session.get_user_details() {
//!     println!("Signed in as {}", user.id);
//! }
//! let dark_mode = session.get_boolean_flag("is_dark_mode", Some(false))?;
//! # let _ = dark_mode;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::callbacks::{CallbackParams, UserAgent};
use crate::error::{AuthError, AuthResult, FlagError};
use crate::flags::FeatureFlagResolver;
use crate::manager::{SessionState, TokenManager, TokenSnapshot};
use crate::pkce::{CODE_CHALLENGE_METHOD, PkceChallenge};
use crate::storage::SecureStorage;
use crate::transport::TokenEndpoint;
use crate::types::{
    AuthRequestOptions, ClaimMap, ClaimValue, Flag, FlagValue, Organization, Permissions,
    SessionConfig, User, UserOrganizations,
};
use crate::verifier::SignatureVerifier;

/// OAuth2 / OIDC session for one client configuration
///
/// Sessions are independent: several may coexist in one process, each with
/// its own configuration and storage key.
#[derive(Debug, Clone)]
pub struct AuthSession {
    manager: TokenManager,
    flags: FeatureFlagResolver,
    login_active: Arc<AtomicBool>,
}

/// Clears the login-in-progress flag and settles the state when a login ends,
/// including when its future is dropped
struct LoginGuard<'a> {
    active: &'a AtomicBool,
    manager: &'a TokenManager,
}

impl<'a> LoginGuard<'a> {
    fn acquire(active: &'a AtomicBool, manager: &'a TokenManager) -> AuthResult<Self> {
        if active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(AuthError::LoginInProgress);
        }
        manager.begin_login();
        Ok(Self { active, manager })
    }
}

impl Drop for LoginGuard<'_> {
    fn drop(&mut self) {
        self.manager.end_login();
        self.active.store(false, Ordering::Release);
    }
}

impl AuthSession {
    /// Create a session, restoring any persisted token set
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidConfig` if a configured URL does not parse.
    pub fn new(
        config: SessionConfig,
        endpoint: Arc<dyn TokenEndpoint>,
        storage: Arc<dyn SecureStorage>,
        verifier: Arc<dyn SignatureVerifier>,
    ) -> AuthResult<Self> {
        config.validate()?;
        Ok(Self::from_manager(TokenManager::new(
            config, endpoint, storage, verifier,
        )))
    }

    /// Wrap an existing manager
    #[must_use]
    pub fn from_manager(manager: TokenManager) -> Self {
        Self {
            manager,
            flags: FeatureFlagResolver::new(),
            login_active: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Underlying token manager
    #[must_use]
    pub fn manager(&self) -> &TokenManager {
        &self.manager
    }

    /// Session configuration
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        self.manager.config()
    }

    // ------------------------------------------------------------------
    // State
    // ------------------------------------------------------------------

    /// Current state
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.manager.state()
    }

    /// Watch state transitions
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.manager.subscribe()
    }

    /// Authenticated with tokens that are fresh or refreshable
    #[must_use]
    pub fn is_authorized(&self) -> bool {
        self.state() == SessionState::Authenticated
            && self
                .manager
                .snapshot()
                .is_some_and(|snapshot| snapshot.is_recoverable())
    }

    /// Bearer access token, refreshed if needed
    ///
    /// # Errors
    ///
    /// See [`TokenManager::ensure_fresh`].
    pub async fn access_token(&self) -> AuthResult<String> {
        self.manager.access_token().await
    }

    // ------------------------------------------------------------------
    // Login / logout
    // ------------------------------------------------------------------

    /// Sign in with default request options
    ///
    /// # Errors
    ///
    /// - `LoginInProgress` if another login on this session has not finished
    /// - whatever the user agent returns (`Cancelled`, ...)
    /// - `AuthorizationDenied` / `StateMismatch` / `InvalidResponse` from the callback
    /// - any error of [`TokenManager::exchange_code`]
    pub async fn login(&self, agent: &dyn UserAgent) -> AuthResult<()> {
        self.run_login(agent, &AuthRequestOptions::default(), None)
            .await
    }

    /// Sign in with extra request options
    ///
    /// # Errors
    ///
    /// Same as [`login`](Self::login).
    pub async fn login_with(
        &self,
        agent: &dyn UserAgent,
        options: &AuthRequestOptions,
    ) -> AuthResult<()> {
        self.run_login(agent, options, None).await
    }

    /// Sign in, abandoning the attempt when `cancel` fires before the
    /// redirect arrives
    ///
    /// # Errors
    ///
    /// `AuthError::Cancelled` on cancellation, otherwise as [`login`](Self::login).
    pub async fn login_with_cancel(
        &self,
        agent: &dyn UserAgent,
        options: &AuthRequestOptions,
        cancel: CancellationToken,
    ) -> AuthResult<()> {
        self.run_login(agent, options, Some(cancel)).await
    }

    /// Open the sign-up screen
    ///
    /// # Errors
    ///
    /// Same as [`login`](Self::login).
    pub async fn register(&self, agent: &dyn UserAgent) -> AuthResult<()> {
        self.run_login(agent, &AuthRequestOptions::register(), None)
            .await
    }

    /// Sign up and create an organization named `org_name`
    ///
    /// # Errors
    ///
    /// Same as [`login`](Self::login).
    pub async fn create_org(&self, agent: &dyn UserAgent, org_name: &str) -> AuthResult<()> {
        self.run_login(agent, &AuthRequestOptions::create_org(org_name), None)
            .await
    }

    async fn run_login(
        &self,
        agent: &dyn UserAgent,
        options: &AuthRequestOptions,
        cancel: Option<CancellationToken>,
    ) -> AuthResult<()> {
        let _guard = LoginGuard::acquire(&self.login_active, &self.manager)?;

        let pkce = PkceChallenge::generate();
        let authorization_url = self.authorization_url(&pkce, options)?;
        tracing::debug!(endpoint = %self.config().authorization_endpoint(), "Starting login");

        let presented = agent.present(authorization_url);
        let callback_url = match cancel {
            Some(cancel) => tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    tracing::debug!("Login cancelled");
                    return Err(AuthError::Cancelled);
                }
                result = presented => result?,
            },
            None => presented.await?,
        };

        let callback = CallbackParams::from_url(&callback_url)?;
        self.manager.exchange_code(callback, pkce).await?;
        tracing::debug!("Login complete");
        Ok(())
    }

    /// Authorization request URL for `pkce`
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidConfig` if the authorization endpoint is not a URL.
    pub fn authorization_url(
        &self,
        pkce: &PkceChallenge,
        options: &AuthRequestOptions,
    ) -> AuthResult<Url> {
        let config = self.config();
        let mut url = Url::parse(&config.authorization_endpoint())
            .map_err(|e| AuthError::invalid_config(format!("authorization endpoint: {e}")))?;

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", &config.client_id)
                .append_pair("redirect_uri", &config.redirect_uri)
                .append_pair("scope", &config.scope)
                .append_pair("state", pkce.state())
                .append_pair("code_challenge", pkce.code_challenge())
                .append_pair("code_challenge_method", CODE_CHALLENGE_METHOD);
            if let Some(audience) = &config.audience {
                query.append_pair("audience", audience);
            }
            for (key, value) in options.query_pairs() {
                query.append_pair(key, &value);
            }
        }

        Ok(url)
    }

    /// Revoke and clear the session
    ///
    /// Returns `true` once local state is cleared, which holds even when the
    /// provider could not be reached.
    pub async fn logout(&self) -> bool {
        if let Err(e) = self.manager.revoke().await {
            tracing::warn!("Logout failed: {e}");
        }
        self.manager.snapshot().is_none()
    }

    /// Provider logout URL that redirects back to the post-logout URI
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidConfig` if the logout endpoint is not a URL.
    pub fn logout_url(&self) -> AuthResult<Url> {
        let config = self.config();
        let mut url = Url::parse(&config.logout_endpoint())
            .map_err(|e| AuthError::invalid_config(format!("logout endpoint: {e}")))?;
        url.query_pairs_mut()
            .append_pair("redirect", &config.post_logout_redirect_uri);
        Ok(url)
    }

    // ------------------------------------------------------------------
    // Claim projections
    //
    // These read the installed snapshot without refreshing it. A restored
    // set whose ID token has lapsed keeps answering from those claims until
    // `access_token` refreshes it.
    // ------------------------------------------------------------------

    fn with_claims<T>(&self, f: impl FnOnce(&ClaimMap) -> T) -> T {
        match self.manager.snapshot() {
            Some(snapshot) => f(snapshot.claims()),
            None => f(&ClaimMap::new()),
        }
    }

    /// Installed tokens and claims
    #[must_use]
    pub fn snapshot(&self) -> Option<Arc<TokenSnapshot>> {
        self.manager.snapshot()
    }

    /// Profile of the signed-in user
    #[must_use]
    pub fn get_user_details(&self) -> Option<User> {
        self.with_claims(User::from_claims)
    }

    /// Raw claim by exact key
    ///
    /// Served from the installed ID token, which may have lapsed if the
    /// session was restored and not yet refreshed; see [`access_token`](Self::access_token).
    #[must_use]
    pub fn get_claim(&self, key: &str) -> Option<ClaimValue> {
        self.with_claims(|claims| claims.get(key).cloned())
    }

    /// Permissions granted in the current organization
    #[must_use]
    pub fn get_permissions(&self) -> Option<Permissions> {
        self.with_claims(Permissions::from_claims)
    }

    /// Whether `permission` is granted
    #[must_use]
    pub fn get_permission(&self, permission: &str) -> bool {
        self.get_permissions()
            .is_some_and(|permissions| permissions.contains(permission))
    }

    /// Organization the session is signed in to
    #[must_use]
    pub fn get_organization(&self) -> Option<Organization> {
        self.with_claims(Organization::from_claims)
    }

    /// Every organization the user belongs to
    #[must_use]
    pub fn get_user_organizations(&self) -> Option<UserOrganizations> {
        self.with_claims(UserOrganizations::from_claims)
    }

    // ------------------------------------------------------------------
    // Feature flags
    // ------------------------------------------------------------------

    /// Untyped flag lookup
    ///
    /// # Errors
    ///
    /// See [`FeatureFlagResolver::get_flag`].
    pub fn get_flag(&self, code: &str, default: Option<FlagValue>) -> Result<Flag, FlagError> {
        self.with_claims(|claims| self.flags.get_flag(claims, code, default))
    }

    /// Boolean flag lookup
    ///
    /// # Errors
    ///
    /// See [`FeatureFlagResolver::get_boolean_flag`].
    pub fn get_boolean_flag(&self, code: &str, default: Option<bool>) -> Result<bool, FlagError> {
        self.with_claims(|claims| self.flags.get_boolean_flag(claims, code, default))
    }

    /// String flag lookup
    ///
    /// # Errors
    ///
    /// See [`FeatureFlagResolver::get_string_flag`].
    pub fn get_string_flag(&self, code: &str, default: Option<&str>) -> Result<String, FlagError> {
        self.with_claims(|claims| self.flags.get_string_flag(claims, code, default))
    }

    /// Integer flag lookup
    ///
    /// # Errors
    ///
    /// See [`FeatureFlagResolver::get_integer_flag`].
    pub fn get_integer_flag(&self, code: &str, default: Option<i64>) -> Result<i64, FlagError> {
        self.with_claims(|claims| self.flags.get_integer_flag(claims, code, default))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use crate::transport::{
        CodeExchangeRequest, EndpointError, RefreshRequest, RevokeRequest, TokenResponse,
    };
    use crate::verifier::JwtKeyVerifier;
    use async_trait::async_trait;

    struct Unreachable;

    #[async_trait]
    impl TokenEndpoint for Unreachable {
        async fn exchange_code(
            &self,
            _request: CodeExchangeRequest,
        ) -> Result<TokenResponse, EndpointError> {
            Err(EndpointError::Transport("unreachable".to_string()))
        }

        async fn refresh(&self, _request: RefreshRequest) -> Result<TokenResponse, EndpointError> {
            Err(EndpointError::Transport("unreachable".to_string()))
        }

        async fn revoke(&self, _request: RevokeRequest) -> Result<(), EndpointError> {
            Err(EndpointError::Transport("unreachable".to_string()))
        }
    }

    fn session(audience: Option<&str>) -> AuthSession {
        let builder = SessionConfig::builder()
            .issuer("https://my-business.kinde.com")
            .client_id("my-client-id")
            .redirect_uri("my-url-scheme://kinde_callback")
            .post_logout_redirect_uri("my-url-scheme://kinde_callback");
        let config = match audience {
            Some(audience) => builder.audience(audience).build(),
            None => builder.build(),
        };
        AuthSession::new(
            config,
            Arc::new(Unreachable),
            Arc::new(MemoryStorage::new()),
            Arc::new(JwtKeyVerifier::hs256(b"secret")),
        )
        .unwrap()
    }

    fn query(url: &Url, key: &str) -> Option<String> {
        url.query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    #[test]
    fn test_authorization_url() {
        let session = session(Some("api"));
        let pkce = PkceChallenge::generate();
        let url = session
            .authorization_url(&pkce, &AuthRequestOptions::default())
            .unwrap();

        assert_eq!(url.path(), "/oauth2/auth");
        assert_eq!(query(&url, "response_type").as_deref(), Some("code"));
        assert_eq!(query(&url, "client_id").as_deref(), Some("my-client-id"));
        assert_eq!(
            query(&url, "redirect_uri").as_deref(),
            Some("my-url-scheme://kinde_callback")
        );
        assert_eq!(
            query(&url, "scope").as_deref(),
            Some("offline openid email profile")
        );
        assert_eq!(query(&url, "state").as_deref(), Some(pkce.state()));
        assert_eq!(
            query(&url, "code_challenge").as_deref(),
            Some(pkce.code_challenge())
        );
        assert_eq!(query(&url, "code_challenge_method").as_deref(), Some("S256"));
        assert_eq!(query(&url, "audience").as_deref(), Some("api"));
        assert!(query(&url, "code_verifier").is_none());
        assert!(query(&url, "prompt").is_none());
    }

    #[test]
    fn test_authorization_url_options() {
        let session = session(None);
        let pkce = PkceChallenge::generate();
        let url = session
            .authorization_url(&pkce, &AuthRequestOptions::create_org("Acme"))
            .unwrap();
        assert_eq!(query(&url, "prompt").as_deref(), Some("create"));
        assert_eq!(query(&url, "org_name").as_deref(), Some("Acme"));
        assert_eq!(query(&url, "is_create_org").as_deref(), Some("true"));
        assert!(query(&url, "audience").is_none());
    }

    #[test]
    fn test_logout_url() {
        let url = session(None).logout_url().unwrap();
        assert_eq!(url.path(), "/logout");
        assert_eq!(
            query(&url, "redirect").as_deref(),
            Some("my-url-scheme://kinde_callback")
        );
    }

    #[test]
    fn test_unauthenticated_projections() {
        let session = session(None);
        assert!(!session.is_authorized());
        assert!(session.get_user_details().is_none());
        assert!(session.get_claim("sub").is_none());
        assert!(session.get_permissions().is_none());
        assert!(!session.get_permission("read:posts"));
        assert!(session.get_organization().is_none());
        assert!(session.get_user_organizations().is_none());
        assert_eq!(session.get_integer_flag("limit", Some(3)).unwrap(), 3);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = SessionConfig::builder()
            .issuer("not a url")
            .client_id("c")
            .redirect_uri("app://cb")
            .post_logout_redirect_uri("app://cb")
            .build();
        let result = AuthSession::new(
            config,
            Arc::new(Unreachable),
            Arc::new(MemoryStorage::new()),
            Arc::new(JwtKeyVerifier::hs256(b"secret")),
        );
        assert!(matches!(result, Err(AuthError::InvalidConfig(_))));
    }
}
