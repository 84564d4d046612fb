//! Integration tests for token refresh: single flight, failure handling and
//! completion after callers go away

mod common;

use common::*;
use futures::future::join_all;
use oidc_auth_session::{AuthError, ClaimValue, MemoryStorage, SessionState, TokenSet, TokenStore};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Single flight
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_share_one_refresh() {
    init_tracing();
    let storage = Arc::new(MemoryStorage::new());
    persist_stale_tokens(&storage, Some("refresh-stale"));
    let endpoint = Arc::new(FakeEndpoint {
        refresh_delay: Duration::from_millis(100),
        ..FakeEndpoint::default()
    });
    let session = session_with(endpoint.clone(), storage);
    assert!(session.is_authorized());

    let callers = (0..16).map(|_| {
        let manager = session.manager().clone();
        tokio::spawn(async move { manager.ensure_fresh().await })
    });
    let results = join_all(callers).await;

    assert_eq!(endpoint.refresh_count(), 1);
    let tokens: Vec<_> = results.into_iter().map(|r| r.unwrap().unwrap()).collect();
    assert!(tokens.iter().all(|t| t == &tokens[0]));
    assert_eq!(tokens[0].access_token, "access-refreshed-1");
    assert_eq!(tokens[0].refresh_token.as_deref(), Some("refresh-rotated-1"));

    // Installed set is fresh; no further network calls
    session.access_token().await.unwrap();
    assert_eq!(endpoint.refresh_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_share_one_failure() {
    let storage = Arc::new(MemoryStorage::new());
    persist_stale_tokens(&storage, Some("refresh-revoked"));
    let endpoint = Arc::new(FakeEndpoint {
        refresh_delay: Duration::from_millis(100),
        refresh_outcome: RefreshOutcome::Rejected,
        ..FakeEndpoint::default()
    });
    let session = session_with(endpoint.clone(), storage.clone());

    let callers = (0..8).map(|_| {
        let manager = session.manager().clone();
        tokio::spawn(async move { manager.ensure_fresh().await })
    });
    let results = join_all(callers).await;

    assert_eq!(endpoint.refresh_count(), 1);
    for result in results {
        assert_eq!(result.unwrap().unwrap_err(), AuthError::SessionExpired);
    }
    assert_eq!(session.state(), SessionState::Unauthenticated);
    assert!(!session.is_authorized());
    assert!(storage.is_empty());
}

// ============================================================================
// Failure handling
// ============================================================================

#[tokio::test]
async fn test_network_failure_keeps_tokens() {
    let storage = Arc::new(MemoryStorage::new());
    persist_stale_tokens(&storage, Some("refresh-stale"));
    let endpoint = Arc::new(FakeEndpoint {
        refresh_outcome: RefreshOutcome::Offline,
        ..FakeEndpoint::default()
    });
    let session = session_with(endpoint.clone(), storage.clone());

    let err = session.access_token().await.unwrap_err();
    assert!(matches!(err, AuthError::Network(_)));
    assert_eq!(session.state(), SessionState::Authenticated);
    assert!(session.is_authorized());
    assert_eq!(storage.len(), 1);

    // Next call tries again
    let _ = session.access_token().await;
    assert_eq!(endpoint.refresh_count(), 2);
}

#[tokio::test]
async fn test_refreshed_tokens_are_persisted() {
    let storage = Arc::new(MemoryStorage::new());
    persist_stale_tokens(&storage, Some("refresh-stale"));
    let session = session_with(Arc::new(FakeEndpoint::default()), storage.clone());

    session.access_token().await.unwrap();

    let restored = session_with(Arc::new(FakeEndpoint::default()), storage);
    let snapshot = restored.snapshot().unwrap();
    assert_eq!(snapshot.tokens().access_token, "access-refreshed-1");
    assert!(!snapshot.needs_refresh());
}

#[tokio::test]
async fn test_logout_during_refresh_waits_for_it() {
    let storage = Arc::new(MemoryStorage::new());
    persist_stale_tokens(&storage, Some("refresh-stale"));
    let endpoint = Arc::new(FakeEndpoint {
        refresh_delay: Duration::from_millis(100),
        ..FakeEndpoint::default()
    });
    let session = session_with(endpoint.clone(), storage.clone());

    let refresh = {
        let manager = session.manager().clone();
        tokio::spawn(async move { manager.ensure_fresh().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(session.logout().await);
    assert!(refresh.await.unwrap().is_ok());

    // Revocation saw the rotated refresh token
    let revoke = endpoint.last_revoke.lock().unwrap().clone().unwrap();
    assert_eq!(revoke.token, "refresh-rotated-1");
    assert!(storage.is_empty());
    assert!(!session.is_authorized());
}

// ============================================================================
// Completion after callers go away
// ============================================================================

#[tokio::test]
async fn test_refresh_completes_after_caller_is_dropped() {
    let storage = Arc::new(MemoryStorage::new());
    persist_stale_tokens(&storage, Some("refresh-stale"));
    let endpoint = Arc::new(FakeEndpoint {
        refresh_delay: Duration::from_millis(100),
        ..FakeEndpoint::default()
    });
    let session = session_with(endpoint.clone(), storage.clone());

    let timed_out =
        tokio::time::timeout(Duration::from_millis(10), session.manager().ensure_fresh()).await;
    assert!(timed_out.is_err());

    tokio::time::sleep(Duration::from_millis(250)).await;

    assert_eq!(endpoint.refresh_count(), 1);
    let snapshot = session.snapshot().unwrap();
    assert_eq!(snapshot.tokens().access_token, "access-refreshed-1");

    // Later callers see the installed set
    assert_eq!(session.access_token().await.unwrap(), "access-refreshed-1");
    assert_eq!(endpoint.refresh_count(), 1);
}

// ============================================================================
// Projections of a restored, lapsed ID token
// ============================================================================

#[tokio::test]
async fn test_projections_serve_restored_claims_until_refresh() {
    let storage = Arc::new(MemoryStorage::new());
    let mut claims = profile_claims();
    claims["given_name"] = serde_json::json!("Before");
    let tokens = TokenSet::new(
        "access-stale".to_string(),
        id_token_with(&claims, -60, SECRET),
        Some("refresh-stale".to_string()),
        3600,
        None,
    );
    TokenStore::new(storage.clone(), config().storage_key)
        .save(&tokens)
        .unwrap();

    let endpoint = Arc::new(FakeEndpoint::default());
    let session = session_with(endpoint.clone(), storage);

    assert!(session.snapshot().unwrap().needs_refresh());
    assert_eq!(session.get_claim("given_name"), Some(ClaimValue::from("Before")));

    assert_eq!(session.access_token().await.unwrap(), "access-refreshed-1");
    assert_eq!(session.get_claim("given_name"), Some(ClaimValue::from("Jane")));
    assert_eq!(endpoint.refresh_count(), 1);
}
