//! Token lifecycle: code exchange, refresh and revocation
//!
//! The manager is the only writer of the token set. Every write (exchange,
//! refresh, revoke) runs on a spawned task behind one async write gate, so
//! a network call that has been dispatched always completes and the stored
//! set is never left half-updated when a caller goes away.
//!
//! The token set and its decoded claims are published together as one
//! [`TokenSnapshot`]; readers clone an `Arc` and never observe a token set
//! without its claims.

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::watch;

use crate::callbacks::CallbackParams;
use crate::claims::ClaimResolver;
use crate::error::{AuthError, AuthResult, InvalidTokenReason};
use crate::pkce::PkceChallenge;
use crate::storage::{SecureStorage, StorageError, TokenStore};
use crate::transport::{
    CodeExchangeRequest, EndpointError, RefreshRequest, RevokeRequest, TokenEndpoint,
    TokenResponse, TokenTypeHint,
};
use crate::types::{ClaimMap, ClaimValue, SessionConfig, TokenSet};
use crate::utils::unix_now;
use crate::verifier::SignatureVerifier;

/// Externally visible session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// No usable token set
    Unauthenticated,
    /// A first login is waiting for its callback or code exchange
    Authenticating,
    /// A validated token set is installed
    Authenticated,
}

/// A token set paired with the claims of its ID token
#[derive(Debug, Clone, PartialEq)]
pub struct TokenSnapshot {
    tokens: TokenSet,
    claims: ClaimMap,
    leeway_secs: u64,
}

impl TokenSnapshot {
    /// Installed tokens
    #[must_use]
    pub fn tokens(&self) -> &TokenSet {
        &self.tokens
    }

    /// Claims decoded from `tokens().id_token`
    #[must_use]
    pub fn claims(&self) -> &ClaimMap {
        &self.claims
    }

    /// Whether the ID token's `exp` has passed, allowing the configured leeway
    #[must_use]
    pub fn id_token_expired(&self) -> bool {
        self.claims
            .get("exp")
            .and_then(ClaimValue::as_f64)
            .is_none_or(|exp| exp + self.leeway_secs as f64 <= unix_now() as f64)
    }

    /// Whether a refresh is due before the set can be used
    #[must_use]
    pub fn needs_refresh(&self) -> bool {
        self.tokens.is_expired() || self.id_token_expired()
    }

    /// Whether the set is usable now or after a refresh
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !self.needs_refresh() || self.tokens.can_refresh()
    }
}

type SharedRefresh = Shared<BoxFuture<'static, AuthResult<Arc<TokenSnapshot>>>>;

struct Inner {
    config: SessionConfig,
    endpoint: Arc<dyn TokenEndpoint>,
    store: TokenStore,
    resolver: ClaimResolver,
    current: RwLock<Option<Arc<TokenSnapshot>>>,
    write_gate: tokio::sync::Mutex<()>,
    in_flight: Mutex<Option<SharedRefresh>>,
    state: watch::Sender<SessionState>,
}

/// Owns the token set for one session
#[derive(Clone)]
pub struct TokenManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("state", &self.state())
            .field("store", &self.inner.store)
            .finish_non_exhaustive()
    }
}

impl TokenManager {
    /// Create a manager and restore any persisted token set
    ///
    /// Restore rules:
    /// - a set whose ID token validates is installed;
    /// - a set whose only failure is an expired ID token is installed when
    ///   it carries a refresh token, and refreshed on first use;
    /// - an expired set without a refresh token is deleted from storage;
    /// - anything else is deleted from storage as well.
    pub fn new(
        config: SessionConfig,
        endpoint: Arc<dyn TokenEndpoint>,
        storage: Arc<dyn SecureStorage>,
        verifier: Arc<dyn SignatureVerifier>,
    ) -> Self {
        let resolver = ClaimResolver::new(&config, verifier);
        let store = TokenStore::new(storage, config.storage_key.clone());
        let (state, _) = watch::channel(SessionState::Unauthenticated);

        let manager = Self {
            inner: Arc::new(Inner {
                config,
                endpoint,
                store,
                resolver,
                current: RwLock::new(None),
                write_gate: tokio::sync::Mutex::new(()),
                in_flight: Mutex::new(None),
                state,
            }),
        };
        manager.inner.restore();
        manager
    }

    /// Configuration in use
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Claim resolver in use
    #[must_use]
    pub fn resolver(&self) -> &ClaimResolver {
        &self.inner.resolver
    }

    /// Current session state
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.inner.state.borrow()
    }

    /// Watch state transitions
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// Installed tokens and claims, if any
    #[must_use]
    pub fn snapshot(&self) -> Option<Arc<TokenSnapshot>> {
        self.inner.snapshot()
    }

    /// Redeem an authorization code
    ///
    /// The callback state is checked before anything touches the network,
    /// and the ID token is validated before anything touches storage.
    ///
    /// # Errors
    ///
    /// - `StateMismatch` if the callback state is not the challenge's state
    /// - `TokenRejected` / `Network` / `InvalidResponse` from the token endpoint
    /// - `InvalidToken` if the returned ID token fails validation
    /// - `Storage` if the validated set cannot be persisted
    pub async fn exchange_code(
        &self,
        callback: CallbackParams,
        pkce: PkceChallenge,
    ) -> AuthResult<TokenSet> {
        if !pkce.verify_state(&callback.state) {
            tracing::warn!("Callback state does not match the login attempt");
            return Err(AuthError::StateMismatch);
        }

        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            let _gate = inner.write_gate.lock().await;
            inner.exchange_locked(callback, pkce).await
        });
        let snapshot = task
            .await
            .map_err(|e| AuthError::network(format!("code exchange task failed: {e}")))??;
        Ok(snapshot.tokens.clone())
    }

    /// Return a usable token set, refreshing it first if it has expired
    ///
    /// Concurrent callers share one refresh: the first caller starts it and
    /// every caller awaits the same result.
    ///
    /// # Errors
    ///
    /// - `NotAuthenticated` if no set is installed
    /// - `SessionExpired` if there is no refresh token or the provider rejected it
    /// - `Network` / `InvalidResponse` if the refresh call failed (tokens kept)
    /// - `InvalidToken` if the refreshed ID token failed validation
    pub async fn ensure_fresh(&self) -> AuthResult<TokenSet> {
        let current = self.inner.snapshot().ok_or(AuthError::NotAuthenticated)?;
        if !current.needs_refresh() {
            return Ok(current.tokens.clone());
        }

        let refreshed = Inner::shared_refresh(&self.inner).await?;
        Ok(refreshed.tokens.clone())
    }

    /// Bearer access token, refreshed if needed
    ///
    /// # Errors
    ///
    /// Same as [`ensure_fresh`](Self::ensure_fresh).
    pub async fn access_token(&self) -> AuthResult<String> {
        self.ensure_fresh().await.map(|tokens| tokens.access_token)
    }

    /// Revoke at the provider (best effort) and clear local state
    ///
    /// Local state is cleared whatever the provider answers. Calling this
    /// while unauthenticated succeeds without a network call.
    ///
    /// # Errors
    ///
    /// Currently always `Ok`; a failed delete is logged.
    pub async fn revoke(&self) -> AuthResult<()> {
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            let _gate = inner.write_gate.lock().await;
            inner.revoke_locked().await;
        });
        if let Err(e) = task.await {
            tracing::warn!("Revocation task failed: {e}");
            self.inner.clear();
        }
        Ok(())
    }

    /// Enter `Authenticating` if no session exists yet
    pub(crate) fn begin_login(&self) {
        self.inner.state.send_if_modified(|state| {
            if *state == SessionState::Unauthenticated {
                *state = SessionState::Authenticating;
                true
            } else {
                false
            }
        });
    }

    /// Leave `Authenticating` after a login attempt ended without installing tokens
    pub(crate) fn end_login(&self) {
        let next = if self.inner.snapshot().is_some() {
            SessionState::Authenticated
        } else {
            SessionState::Unauthenticated
        };
        self.inner.set_state(next);
    }
}

impl Inner {
    fn snapshot(&self) -> Option<Arc<TokenSnapshot>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_state(&self, next: SessionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            tracing::debug!(?previous, ?next, "Session state changed");
        }
    }

    fn restore(&self) {
        let tokens = match self.store.load() {
            Ok(Some(tokens)) => tokens,
            Ok(None) => {
                tracing::debug!("No persisted token set");
                return;
            }
            Err(StorageError::Json(e)) => {
                tracing::warn!("Discarding unreadable token set: {e}");
                self.clear_store();
                return;
            }
            Err(e) => {
                tracing::warn!("Could not load persisted token set: {e}");
                return;
            }
        };

        let claims = match self.resolver.decode(&tokens.id_token) {
            Ok(claims) => claims,
            Err(AuthError::InvalidToken {
                reason: InvalidTokenReason::Expired,
            }) if tokens.can_refresh() => {
                match self.resolver.decode_ignoring_expiry(&tokens.id_token) {
                    Ok(claims) => claims,
                    Err(e) => {
                        tracing::warn!("Discarding persisted token set: {e}");
                        self.clear_store();
                        return;
                    }
                }
            }
            Err(e) => {
                tracing::warn!("Discarding persisted token set: {e}");
                self.clear_store();
                return;
            }
        };

        let snapshot = TokenSnapshot {
            tokens,
            claims,
            leeway_secs: self.config.leeway_secs,
        };
        if !snapshot.is_recoverable() {
            tracing::debug!("Discarding expired token set without a refresh token");
            self.clear_store();
            return;
        }
        tracing::debug!(
            needs_refresh = snapshot.needs_refresh(),
            "Restored persisted token set"
        );
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(snapshot));
        self.set_state(SessionState::Authenticated);
    }

    /// Validate a token endpoint response into a snapshot; nothing is stored
    fn accept(
        &self,
        response: TokenResponse,
        previous_refresh_token: Option<String>,
    ) -> AuthResult<TokenSnapshot> {
        let id_token = response
            .id_token
            .ok_or_else(|| AuthError::invalid_response("token response has no id_token"))?;
        let claims = self.resolver.decode(&id_token)?;

        let expires_in = response.expires_in.unwrap_or_else(|| {
            claims
                .get("exp")
                .and_then(ClaimValue::as_i64)
                .map_or(0, |exp| u64::try_from(exp).unwrap_or(0).saturating_sub(unix_now()))
        });

        let mut tokens = TokenSet::new(
            response.access_token,
            id_token,
            // Keep the old refresh token unless the provider rotated it
            response.refresh_token.or(previous_refresh_token),
            expires_in,
            response.scope,
        );
        if let Some(token_type) = response.token_type {
            tokens.token_type = token_type;
        }

        Ok(TokenSnapshot {
            tokens,
            claims,
            leeway_secs: self.config.leeway_secs,
        })
    }

    /// Persist, then publish the pair in one swap
    fn install(&self, snapshot: TokenSnapshot) -> AuthResult<Arc<TokenSnapshot>> {
        self.store.save(&snapshot.tokens)?;
        let snapshot = Arc::new(snapshot);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&snapshot));
        self.set_state(SessionState::Authenticated);
        Ok(snapshot)
    }

    fn clear_store(&self) {
        if let Err(e) = self.store.clear() {
            tracing::warn!("Could not delete persisted token set: {e}");
        }
    }

    fn clear(&self) {
        self.clear_store();
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = None;
        self.set_state(SessionState::Unauthenticated);
    }

    async fn exchange_locked(
        &self,
        callback: CallbackParams,
        pkce: PkceChallenge,
    ) -> AuthResult<Arc<TokenSnapshot>> {
        let request = CodeExchangeRequest {
            token_endpoint: self.config.token_endpoint(),
            code: callback.code,
            code_verifier: pkce.code_verifier().to_string(),
            redirect_uri: self.config.redirect_uri.clone(),
            client_id: self.config.client_id.clone(),
        };
        // Challenge is spent whatever happens next
        drop(pkce);

        let response = self
            .endpoint
            .exchange_code(request)
            .await
            .map_err(|e| match e {
                EndpointError::Transport(msg) => AuthError::Network(msg),
                EndpointError::Rejected { error, description } => {
                    AuthError::TokenRejected { error, description }
                }
                EndpointError::InvalidResponse(msg) => AuthError::InvalidResponse(msg),
            })?;

        let snapshot = self.accept(response, None).inspect_err(|e| {
            tracing::warn!("Rejected tokens from code exchange: {e}");
        })?;
        let snapshot = self.install(snapshot)?;
        tracing::debug!("Code exchange complete");
        Ok(snapshot)
    }

    /// Attach to the outstanding refresh, or start one
    fn shared_refresh(this: &Arc<Self>) -> SharedRefresh {
        let mut slot = this.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = slot.as_ref() {
            tracing::debug!("Joining in-flight token refresh");
            return existing.clone();
        }

        let inner = Arc::clone(this);
        let task = tokio::spawn(async move {
            let result = {
                let _gate = inner.write_gate.lock().await;
                inner.refresh_locked().await
            };
            // Later callers see the installed snapshot instead of this future
            inner
                .in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            result
        });

        let shared = async move {
            task.await.unwrap_or_else(|e| {
                Err(AuthError::network(format!("refresh task failed: {e}")))
            })
        }
        .boxed()
        .shared();
        *slot = Some(shared.clone());
        shared
    }

    async fn refresh_locked(&self) -> AuthResult<Arc<TokenSnapshot>> {
        // Logged out, or refreshed by someone holding the gate before us
        let current = self.snapshot().ok_or(AuthError::NotAuthenticated)?;
        if !current.needs_refresh() {
            return Ok(current);
        }

        let Some(refresh_token) = current
            .tokens
            .refresh_token
            .clone()
            .filter(|t| !t.is_empty())
        else {
            tracing::debug!("Token set expired without a refresh token");
            self.clear();
            return Err(AuthError::SessionExpired);
        };

        tracing::debug!("Refreshing token set");
        let request = RefreshRequest {
            token_endpoint: self.config.token_endpoint(),
            refresh_token: refresh_token.clone(),
            client_id: self.config.client_id.clone(),
        };

        match self.endpoint.refresh(request).await {
            Ok(response) => match self.accept(response, Some(refresh_token)) {
                Ok(snapshot) => {
                    let snapshot = self.install(snapshot)?;
                    tracing::debug!("Token refresh complete");
                    Ok(snapshot)
                }
                Err(e) => {
                    tracing::warn!("Refreshed tokens rejected: {e}");
                    self.clear();
                    Err(e)
                }
            },
            Err(EndpointError::Rejected { error, .. }) => {
                tracing::warn!(%error, "Refresh token rejected");
                self.clear();
                Err(AuthError::SessionExpired)
            }
            Err(EndpointError::Transport(msg)) => {
                tracing::warn!("Token refresh failed: {msg}");
                Err(AuthError::Network(msg))
            }
            Err(EndpointError::InvalidResponse(msg)) => {
                tracing::warn!("Token refresh failed: {msg}");
                Err(AuthError::InvalidResponse(msg))
            }
        }
    }

    async fn revoke_locked(&self) {
        let Some(current) = self.snapshot() else {
            // Nothing installed; storage may still hold an unreadable set
            self.clear();
            return;
        };

        let (token, token_type_hint) = match current.tokens.refresh_token.as_deref() {
            Some(refresh) if !refresh.is_empty() => {
                (refresh.to_string(), TokenTypeHint::RefreshToken)
            }
            _ => (
                current.tokens.access_token.clone(),
                TokenTypeHint::AccessToken,
            ),
        };
        let request = RevokeRequest {
            revocation_endpoint: self.config.revocation_endpoint(),
            token,
            token_type_hint,
            client_id: self.config.client_id.clone(),
        };

        if let Err(e) = self.endpoint.revoke(request).await {
            tracing::warn!("Token revocation failed, clearing local state anyway: {e}");
        }
        self.clear();
    }
}
