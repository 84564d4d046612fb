//! Shared fixtures: a scripted token endpoint, user agents and HS256 ID tokens

#![allow(dead_code)]

use async_trait::async_trait;
use jsonwebtoken::{EncodingKey, Header, encode};
use oidc_auth_session::transport::{
    CodeExchangeRequest, EndpointError, RefreshRequest, RevokeRequest, TokenResponse,
};
use oidc_auth_session::utils::unix_now;
use oidc_auth_session::{
    AuthResult, AuthSession, JwtKeyVerifier, MemoryStorage, SessionConfig, TokenEndpoint,
    TokenSet, TokenStore, UserAgent,
};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

pub const ISSUER: &str = "https://my-business.kinde.com";
pub const CLIENT_ID: &str = "my-client-id";
pub const REDIRECT_URI: &str = "my-url-scheme://kinde_callback";
pub const SECRET: &[u8] = b"integration-test-secret";
pub const AUTH_CODE: &str = "auth-code";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn config() -> SessionConfig {
    SessionConfig::builder()
        .issuer(ISSUER)
        .client_id(CLIENT_ID)
        .redirect_uri(REDIRECT_URI)
        .post_logout_redirect_uri(REDIRECT_URI)
        .build()
}

/// Claims carried by every ID token the fake endpoint issues
pub fn profile_claims() -> Value {
    json!({
        "sub": "kp_123",
        "email": "jane@example.com",
        "given_name": "Jane",
        "family_name": "Doe",
        "org_code": "org_1",
        "org_codes": ["org_1", "org_2"],
        "permissions": ["read:posts", "write:posts"],
        "feature_flags": {
            "theme": {"t": "s", "v": "pink"},
            "is_dark_mode": {"t": "b", "v": true},
            "competitions_limit": {"t": "i", "v": 5}
        }
    })
}

/// HS256 ID token for `claims` plus `iss`, `aud` and `exp = now + exp_offset`
pub fn id_token_with(claims: &Value, exp_offset: i64, secret: &[u8]) -> String {
    let mut claims = claims.clone();
    let now = unix_now() as i64;
    claims["iss"] = json!(ISSUER);
    claims["aud"] = json!([CLIENT_ID]);
    claims["iat"] = json!(now);
    claims["exp"] = json!(now + exp_offset);
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret)).unwrap()
}

pub fn id_token(exp_offset: i64) -> String {
    id_token_with(&profile_claims(), exp_offset, SECRET)
}

/// How the fake endpoint answers refresh grants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Success,
    Rejected,
    Offline,
}

pub struct FakeEndpoint {
    pub exchanges: AtomicUsize,
    pub refreshes: AtomicUsize,
    pub revokes: AtomicUsize,
    pub refresh_delay: Duration,
    pub refresh_outcome: RefreshOutcome,
    pub revoke_fails: bool,
    pub signing_secret: Vec<u8>,
    /// `exp` of issued ID tokens, relative to now
    pub id_token_exp_offset: i64,
    pub issue_refresh_token: bool,
    pub last_exchange: Mutex<Option<CodeExchangeRequest>>,
    pub last_revoke: Mutex<Option<RevokeRequest>>,
}

impl Default for FakeEndpoint {
    fn default() -> Self {
        Self {
            exchanges: AtomicUsize::new(0),
            refreshes: AtomicUsize::new(0),
            revokes: AtomicUsize::new(0),
            refresh_delay: Duration::ZERO,
            refresh_outcome: RefreshOutcome::Success,
            revoke_fails: false,
            signing_secret: SECRET.to_vec(),
            id_token_exp_offset: 3600,
            issue_refresh_token: true,
            last_exchange: Mutex::new(None),
            last_revoke: Mutex::new(None),
        }
    }
}

impl FakeEndpoint {
    pub fn exchange_count(&self) -> usize {
        self.exchanges.load(Ordering::SeqCst)
    }

    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub fn revoke_count(&self) -> usize {
        self.revokes.load(Ordering::SeqCst)
    }

    fn response(&self, access_token: String, refresh_token: Option<String>) -> TokenResponse {
        TokenResponse {
            access_token,
            id_token: Some(id_token_with(
                &profile_claims(),
                self.id_token_exp_offset,
                &self.signing_secret,
            )),
            refresh_token: refresh_token.filter(|_| self.issue_refresh_token),
            expires_in: Some(3600),
            token_type: Some("Bearer".to_string()),
            scope: Some("offline openid email profile".to_string()),
        }
    }
}

#[async_trait]
impl TokenEndpoint for FakeEndpoint {
    async fn exchange_code(
        &self,
        request: CodeExchangeRequest,
    ) -> Result<TokenResponse, EndpointError> {
        self.exchanges.fetch_add(1, Ordering::SeqCst);
        let code = request.code.clone();
        *self.last_exchange.lock().unwrap() = Some(request);

        if code != AUTH_CODE {
            return Err(EndpointError::Rejected {
                error: "invalid_grant".to_string(),
                description: Some("unknown code".to_string()),
            });
        }
        Ok(self.response(
            "access-initial".to_string(),
            Some("refresh-initial".to_string()),
        ))
    }

    async fn refresh(&self, _request: RefreshRequest) -> Result<TokenResponse, EndpointError> {
        let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.refresh_delay.is_zero() {
            tokio::time::sleep(self.refresh_delay).await;
        }
        match self.refresh_outcome {
            RefreshOutcome::Success => Ok(self.response(
                format!("access-refreshed-{n}"),
                Some(format!("refresh-rotated-{n}")),
            )),
            RefreshOutcome::Rejected => Err(EndpointError::Rejected {
                error: "invalid_grant".to_string(),
                description: None,
            }),
            RefreshOutcome::Offline => Err(EndpointError::Transport("connection refused".to_string())),
        }
    }

    async fn revoke(&self, request: RevokeRequest) -> Result<(), EndpointError> {
        self.revokes.fetch_add(1, Ordering::SeqCst);
        *self.last_revoke.lock().unwrap() = Some(request);
        if self.revoke_fails {
            return Err(EndpointError::Transport("connection refused".to_string()));
        }
        Ok(())
    }
}

/// Answers the authorization request the way the provider would
pub struct RedirectingAgent {
    pub code: String,
    pub forge_state: bool,
    pub presented: Mutex<Vec<Url>>,
}

impl RedirectingAgent {
    pub fn new() -> Self {
        Self {
            code: AUTH_CODE.to_string(),
            forge_state: false,
            presented: Mutex::new(Vec::new()),
        }
    }

    pub fn forging_state() -> Self {
        Self {
            forge_state: true,
            ..Self::new()
        }
    }

    pub fn last_presented(&self) -> Option<Url> {
        self.presented.lock().unwrap().last().cloned()
    }
}

pub fn query_param(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

#[async_trait]
impl UserAgent for RedirectingAgent {
    async fn present(&self, authorization_url: Url) -> AuthResult<Url> {
        self.presented.lock().unwrap().push(authorization_url.clone());
        let state = if self.forge_state {
            "forged-state".to_string()
        } else {
            query_param(&authorization_url, "state").unwrap_or_default()
        };

        let mut callback = Url::parse(REDIRECT_URI).unwrap();
        callback
            .query_pairs_mut()
            .append_pair("code", &self.code)
            .append_pair("state", &state);
        Ok(callback)
    }
}

/// Never returns; stands in for a user who walks away
pub struct AbandonedAgent;

#[async_trait]
impl UserAgent for AbandonedAgent {
    async fn present(&self, _authorization_url: Url) -> AuthResult<Url> {
        std::future::pending().await
    }
}

pub fn session_with(endpoint: Arc<FakeEndpoint>, storage: Arc<MemoryStorage>) -> AuthSession {
    session_with_config(config(), endpoint, storage)
}

pub fn session_with_config(
    config: SessionConfig,
    endpoint: Arc<FakeEndpoint>,
    storage: Arc<MemoryStorage>,
) -> AuthSession {
    AuthSession::new(
        config,
        endpoint,
        storage,
        Arc::new(JwtKeyVerifier::hs256(SECRET)),
    )
    .unwrap()
}

/// Persist a token set whose access token has already expired
pub fn persist_stale_tokens(storage: &Arc<MemoryStorage>, refresh_token: Option<&str>) -> TokenSet {
    let store = TokenStore::new(storage.clone(), config().storage_key);
    let mut tokens = TokenSet::new(
        "access-stale".to_string(),
        id_token(3600),
        refresh_token.map(str::to_string),
        3600,
        None,
    );
    tokens.expires_at = unix_now().saturating_sub(10);
    store.save(&tokens).unwrap();
    tokens
}
