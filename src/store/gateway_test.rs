use std::sync::Arc;

use super::*;
use crate::backend::memory::MemoryBackend;
use crate::config::StoreConfig;
use crate::store::test_helpers::{connected_store, settle, wait_for_state};
use crate::types::{StoreState, SubscriptionTier};

// =============================================================================
// normalize_email
// =============================================================================

#[test]
fn normalize_email_accepts_basic_address() {
    assert_eq!(normalize_email("  USER@Example.com "), Some("user@example.com".to_owned()));
}

#[test]
fn normalize_email_rejects_invalid_values() {
    assert_eq!(normalize_email(""), None);
    assert_eq!(normalize_email("user"), None);
    assert_eq!(normalize_email("@example.com"), None);
    assert_eq!(normalize_email("user@"), None);
    assert_eq!(normalize_email("a@b@c"), None);
}

// =============================================================================
// AuthError / AuthOutcome
// =============================================================================

#[test]
fn auth_error_codes() {
    assert_eq!(AuthError::NotInitialized.error_code(), "E_NOT_INITIALIZED");
    assert_eq!(AuthError::InvalidEmail.error_code(), "E_INVALID_EMAIL");
    assert_eq!(AuthError::MissingPassword.error_code(), "E_MISSING_PASSWORD");
    let backend = AuthError::from(BackendError::Unavailable("down".into()));
    assert_eq!(backend.error_code(), "E_BACKEND_UNAVAILABLE");
    assert!(backend.retryable());
    assert!(!AuthError::NotInitialized.retryable());
}

#[test]
fn backend_error_display_is_transparent() {
    let err = AuthError::from(BackendError::rejected("invalid_credentials", "Invalid login credentials"));
    assert_eq!(err.to_string(), "Invalid login credentials");
}

#[test]
fn outcome_helpers() {
    let ok = AuthOutcome::Accepted;
    assert!(ok.is_accepted());
    assert!(ok.error().is_none());
    assert!(ok.descriptor().is_none());
    assert_eq!(ok.into_result(), Ok(()));

    let rejected = AuthOutcome::from(Err(AuthError::InvalidEmail));
    assert!(!rejected.is_accepted());
    let desc = rejected.descriptor().unwrap();
    assert_eq!(desc.code, "E_INVALID_EMAIL");
    assert_eq!(desc.message, "invalid email address");
    assert_eq!(rejected.into_result(), Err(AuthError::InvalidEmail));
}

// =============================================================================
// readiness guard
// =============================================================================

#[tokio::test]
async fn operations_before_connect_degrade() {
    let store = SessionStore::new(StoreConfig::default());

    assert_eq!(store.sign_in(OAuthProvider::Google).await, Err(AuthError::NotInitialized));
    assert_eq!(store.sign_in_with_email("a@example.com", "pw").await, AuthOutcome::Rejected(AuthError::NotInitialized));
    assert_eq!(store.sign_in_with_magic_link("a@example.com").await, AuthOutcome::Rejected(AuthError::NotInitialized));
    store.sign_out().await;

    let state = store.snapshot();
    assert!(state.is_initializing);
    assert_eq!(state, StoreState::initializing());
}

#[tokio::test]
async fn operations_after_shutdown_report_not_initialized() {
    let backend = Arc::new(MemoryBackend::new());
    backend.register_user("a@example.com", "pw");
    let store = connected_store(backend.clone());
    store.shutdown();

    assert_eq!(store.sign_in(OAuthProvider::Github).await, Err(AuthError::NotInitialized));
    assert_eq!(store.sign_in_with_email("a@example.com", "pw").await, AuthOutcome::Rejected(AuthError::NotInitialized));
    assert!(backend.current().is_none());
}

// =============================================================================
// sign_in (federated)
// =============================================================================

#[tokio::test]
async fn federated_sign_in_returns_redirect_without_touching_state() {
    let backend = Arc::new(MemoryBackend::new());
    let store = SessionStore::new(StoreConfig::new("https://app.example.test", "/api/auth/callback").unwrap());
    store.connect(backend);
    let before = store.wait_until_initialized().await;

    let redirect = store.sign_in(OAuthProvider::Github).await.unwrap();
    assert_eq!(redirect.provider, OAuthProvider::Github);
    assert!(redirect.url.contains("provider=github"));
    assert!(redirect.url.contains("redirect_to=https://app.example.test/api/auth/callback"));
    assert_eq!(store.snapshot(), before);
}

#[tokio::test]
async fn federated_sign_in_rejection_is_raised() {
    let backend = Arc::new(MemoryBackend::new());
    backend.disable_provider(OAuthProvider::Azure);
    let store = connected_store(backend);

    let err = store.sign_in(OAuthProvider::Azure).await.unwrap_err();
    assert!(matches!(err, AuthError::Backend(BackendError::Rejected { ref code, .. }) if code == "provider_disabled"));
}

#[tokio::test]
async fn federated_completion_arrives_through_notification() {
    let backend = Arc::new(MemoryBackend::new());
    let user = backend.register_user("alice@example.com", "pw");
    backend.set_balance(user.id, 30);
    let store = connected_store(backend.clone());
    store.wait_until_initialized().await;

    store.sign_in(OAuthProvider::Google).await.unwrap();
    backend.complete_federated_sign_in(OAuthProvider::Google, "alice@example.com").unwrap();

    let state = wait_for_state(&store, |s| s.credits() == 30).await;
    assert_eq!(state.identity_id(), Some(user.id));
}

// =============================================================================
// sign_in_with_email
// =============================================================================

#[tokio::test]
async fn password_sign_in_updates_state_via_notification() {
    let backend = Arc::new(MemoryBackend::new());
    let user = backend.register_user("bob@example.com", "hunter2");
    backend.set_tier(user.id, SubscriptionTier::Starter);
    let store = connected_store(backend);

    let outcome = store.sign_in_with_email(" Bob@Example.com ", "hunter2").await;
    assert_eq!(outcome, AuthOutcome::Accepted);

    let state = wait_for_state(&store, StoreState::is_signed_in).await;
    assert_eq!(state.identity_id(), Some(user.id));
    let state = wait_for_state(&store, |s| s.subscription_tier() == SubscriptionTier::Starter).await;
    assert_eq!(state.credits(), 0);
}

#[tokio::test]
async fn password_sign_in_bad_credentials_returned_as_data() {
    let backend = Arc::new(MemoryBackend::new());
    backend.register_user("carol@example.com", "right");
    let store = connected_store(backend);
    store.wait_until_initialized().await;

    let outcome = store.sign_in_with_email("carol@example.com", "wrong").await;
    let err = outcome.error().unwrap();
    assert!(matches!(err, AuthError::Backend(BackendError::Rejected { code, .. }) if code == "invalid_credentials"));
    assert_eq!(outcome.descriptor().unwrap().code, "E_REJECTED");

    settle().await;
    assert!(!store.snapshot().is_signed_in());
}

#[tokio::test]
async fn password_sign_in_validates_input_before_backend() {
    let backend = Arc::new(MemoryBackend::new());
    let store = connected_store(backend);

    assert_eq!(store.sign_in_with_email("not-an-email", "pw").await, AuthOutcome::Rejected(AuthError::InvalidEmail));
    assert_eq!(store.sign_in_with_email("a@example.com", "").await, AuthOutcome::Rejected(AuthError::MissingPassword));
}

#[tokio::test]
async fn password_sign_in_backend_outage_is_retryable_data() {
    let backend = Arc::new(OutageBackend);
    let store = connected_store(backend);

    let outcome = store.sign_in_with_email("dave@example.com", "pw").await;
    let desc = outcome.descriptor().unwrap();
    assert_eq!(desc.code, "E_BACKEND_UNAVAILABLE");
    assert!(desc.retryable);
}

// =============================================================================
// sign_in_with_magic_link
// =============================================================================

#[tokio::test]
async fn magic_link_request_leaves_state_until_completed() {
    let backend = Arc::new(MemoryBackend::new());
    let store = connected_store(backend.clone());
    let before = store.wait_until_initialized().await;

    assert!(store.sign_in_with_magic_link("Erin@Example.com").await.is_accepted());
    settle().await;
    assert_eq!(store.snapshot(), before);

    let token = backend.pending_link("erin@example.com").unwrap();
    backend.complete_link_sign_in("erin@example.com", &token).unwrap();
    let state = wait_for_state(&store, StoreState::is_signed_in).await;
    assert_eq!(state.identity.and_then(|i| i.email).as_deref(), Some("erin@example.com"));
}

#[tokio::test]
async fn magic_link_invalid_email_returned_as_data() {
    let backend = Arc::new(MemoryBackend::new());
    let store = connected_store(backend.clone());

    let outcome = store.sign_in_with_magic_link("nope").await;
    assert_eq!(outcome, AuthOutcome::Rejected(AuthError::InvalidEmail));
    assert!(backend.pending_link("nope").is_none());
}

// =============================================================================
// sign_out
// =============================================================================

#[tokio::test]
async fn sign_out_clears_everything() {
    let backend = Arc::new(MemoryBackend::new());
    let user = backend.register_user("frank@example.com", "pw");
    backend.set_balance(user.id, 50);
    backend.set_tier(user.id, SubscriptionTier::Pro);
    let store = connected_store(backend.clone());
    assert!(store.sign_in_with_email("frank@example.com", "pw").await.is_accepted());
    wait_for_state(&store, |s| s.credits() == 50).await;

    store.sign_out().await;
    let state = store.snapshot();
    assert!(state.identity.is_none());
    assert!(state.session.is_none());
    assert_eq!(state.credits(), 0);
    assert_eq!(state.subscription_tier(), SubscriptionTier::Free);
    assert!(backend.current().is_none());

    settle().await;
    assert!(!store.snapshot().is_signed_in());
}

#[tokio::test]
async fn sign_out_backend_failure_still_clears_locally() {
    let backend = Arc::new(MemoryBackend::new());
    let user = backend.register_user("gina@example.com", "pw");
    backend.set_balance(user.id, 8);
    let store = connected_store(backend.clone());
    assert!(store.sign_in_with_email("gina@example.com", "pw").await.is_accepted());
    wait_for_state(&store, |s| s.credits() == 8).await;

    backend.fail_sign_out(true);
    store.sign_out().await;

    let state = store.snapshot();
    assert!(!state.is_signed_in());
    assert_eq!(state.credits(), 0);
}

// =============================================================================
// outage backend
// =============================================================================

/// Backend whose every call fails as unreachable.
struct OutageBackend;

#[async_trait::async_trait]
impl crate::backend::IdentityBackend for OutageBackend {
    async fn current_session(&self) -> Result<Option<crate::types::Session>, BackendError> {
        Err(BackendError::Unavailable("connection refused".into()))
    }

    fn on_session_change(&self, _listener: crate::backend::SessionListener) -> crate::backend::SubscriptionHandle {
        crate::backend::SubscriptionHandle::new(|| {})
    }

    async fn sign_in_federated(&self, _provider: OAuthProvider, _redirect_to: &str) -> Result<String, BackendError> {
        Err(BackendError::Unavailable("connection refused".into()))
    }

    async fn sign_in_with_password(&self, _email: &str, _password: &str) -> Result<(), BackendError> {
        Err(BackendError::Unavailable("connection refused".into()))
    }

    async fn sign_in_with_otp(&self, _email: &str, _redirect_to: &str) -> Result<(), BackendError> {
        Err(BackendError::Unavailable("connection refused".into()))
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        Err(BackendError::Unavailable("connection refused".into()))
    }

    async fn balance(&self, _identity_id: uuid::Uuid) -> Result<Option<u64>, BackendError> {
        Err(BackendError::Unavailable("connection refused".into()))
    }

    async fn subscription_tier(&self, _identity_id: uuid::Uuid) -> Result<Option<SubscriptionTier>, BackendError> {
        Err(BackendError::Unavailable("connection refused".into()))
    }
}

#[tokio::test]
async fn unreachable_backend_never_blocks_initialization() {
    let store = connected_store(Arc::new(OutageBackend));
    let state = store.wait_until_initialized().await;
    assert!(!state.is_signed_in());
    store.sign_out().await;
    store.refresh_credits().await;
    assert!(!store.snapshot().is_initializing);
}
