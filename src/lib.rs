//! # OIDC Auth Session
//!
//! OAuth2 / OpenID Connect client sessions for native and command-line apps:
//! Authorization Code flow with PKCE, validated ID tokens, transparent token
//! refresh and typed feature flags. Async, tokio-based.
//!
//! ## Quick Start
//!
//! ```no_run
//! use oidc_auth_session::{
//!     AuthSession, BrowserUserAgent, FileStorage, HttpTokenEndpoint, JwtKeyVerifier,
//!     SessionConfig,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SessionConfig::builder()
//!         .issuer("https://my-business.kinde.com")
//!         .client_id("my-client-id")
//!         .redirect_uri("http://localhost:8080/callback")
//!         .post_logout_redirect_uri("http://localhost:8080")
//!         .build();
//!
//!     let session = AuthSession::new(
//!         config,
//!         Arc::new(HttpTokenEndpoint::new()),
//!         Arc::new(FileStorage::new()),
//!         Arc::new(JwtKeyVerifier::from_jwks(&std::fs::read_to_string("jwks.json")?)?),
//!     )?;
//!
//!     if !session.is_authorized() {
//!         session.login(&BrowserUserAgent::new()).await?;
//!     }
//!
//!     let token = session.access_token().await?;
//!     println!("Bearer {token}");
//!     Ok(())
//! }
//! ```
//!
//! ## Core Features
//!
//! ### 1. Login with [`AuthSession`]
//!
//! [`AuthSession::login`] generates a fresh [`PkceChallenge`], hands the
//! authorization URL to a [`UserAgent`] and redeems the returned code. The
//! callback `state` is compared in constant time before the code is used.
//! Variants: [`AuthSession::register`], [`AuthSession::create_org`],
//! [`AuthSession::login_with`] and [`AuthSession::login_with_cancel`], which
//! races the redirect against a `tokio_util` `CancellationToken`.
//!
//! ### 2. Token lifecycle with [`TokenManager`]
//!
//! ```no_run
//! # use oidc_auth_session::AuthSession;
//! # async fn example(session: AuthSession) -> oidc_auth_session::AuthResult<()> {
//! // Refreshes once, even with many concurrent callers
//! let tokens = session.manager().ensure_fresh().await?;
//! println!("{}", tokens.authorization_header());
//! # Ok(())
//! # }
//! ```
//!
//! Every write goes through one async gate and runs on a spawned task, so
//! a refresh or revocation that reached the network always completes.
//!
//! ### 3. Claims and feature flags
//!
//! ```no_run
//! # use oidc_auth_session::AuthSession;
//! # fn example(session: &AuthSession) -> Result<(), oidc_auth_session::FlagError> {
//! let theme = session.get_string_flag("theme", Some("light"))?;
//! let limit = session.get_integer_flag("competitions_limit", None)?;
//! let user = session.get_user_details();
//! # let _ = (theme, limit, user);
//! # Ok(())
//! # }
//! ```
//!
//! An absent flag yields the supplied default (or `FlagError::NotFound`); a
//! flag of the wrong type yields `FlagError::TypeMismatch` whatever the default.
//!
//! ## Architecture
//!
//! - [`session`] - façade and login orchestration
//! - [`manager`] - token exchange, refresh and revocation
//! - [`claims`] - ID token decoding and validation
//! - [`verifier`] - signature verification (`jsonwebtoken`)
//! - [`flags`] - feature flag resolution
//! - [`pkce`] - PKCE challenge and state
//! - [`storage`] - token persistence
//! - [`transport`] - token endpoint client (`reqwest`)
//! - [`callbacks`] - user agent seam
//! - [`types`] - configuration and data types
//!
//! ## Logging
//!
//! The crate emits `tracing` events and installs no subscriber. Tokens and
//! verifiers are never logged.
//!
//! ```bash
//! RUST_LOG=oidc_auth_session=debug cargo run -p login-demo
//! ```
//!
//! ## Security
//!
//! - ID tokens are validated (signature, `exp`, `nbf`, `iss`, `aud`) before
//!   they are persisted or read
//! - [`FileStorage`] writes token files with mode 600 on Unix
//! - `Debug` output of token sets and PKCE challenges redacts secrets

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod callbacks;
pub mod claims;
pub mod error;
pub mod flags;
pub mod manager;
pub mod pkce;
pub mod session;
pub mod storage;
pub mod transport;
pub mod types;
pub mod utils;
pub mod verifier;

// Re-export commonly used types
pub use callbacks::{BrowserUserAgent, CallbackParams, FnUserAgent, UserAgent};
pub use claims::ClaimResolver;
pub use error::{AuthError, AuthResult, FlagError, InvalidTokenReason};
pub use flags::{FLAGS_CLAIM, FeatureFlagResolver};
pub use manager::{SessionState, TokenManager, TokenSnapshot};
pub use pkce::PkceChallenge;
pub use session::AuthSession;
pub use storage::{FileStorage, MemoryStorage, SecureStorage, StorageError, TokenStore};
pub use transport::{EndpointError, HttpTokenEndpoint, TokenEndpoint, TokenResponse};
pub use types::{
    AuthRequestOptions, ClaimMap, ClaimValue, Flag, FlagType, FlagValue, Organization,
    Permissions, Prompt, SessionConfig, TokenSet, User, UserOrganizations,
};
pub use verifier::{JwtKeyVerifier, SignatureVerifier};

/// Version of the crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
