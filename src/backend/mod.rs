//! Identity & data backend seam.
//!
//! DESIGN
//! ======
//! The store never talks to a provider directly. Everything it needs from
//! the outside world (session lookup, change notifications, sign-in flows,
//! balance and tier records) goes through [`IdentityBackend`], which keeps
//! the store testable with in-process implementations.
//!
//! Every call has a typed result: `Ok(None)` means "no record", `Err` means
//! the call itself failed. The two are never conflated.

pub mod memory;

use std::sync::Arc;

use uuid::Uuid;

use crate::error::ErrorCode;
use crate::types::{OAuthProvider, Session, SessionChange, SubscriptionTier};

// =============================================================================
// ERROR
// =============================================================================

/// Errors produced by backend calls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The backend could not be reached or timed out.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// The backend refused the request (bad credentials, disabled provider).
    #[error("{message}")]
    Rejected { code: String, message: String },

    /// The backend answered with something that could not be interpreted.
    #[error("malformed backend response: {0}")]
    Malformed(String),
}

impl BackendError {
    pub fn rejected(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rejected { code: code.into(), message: message.into() }
    }
}

impl ErrorCode for BackendError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "E_BACKEND_UNAVAILABLE",
            Self::Rejected { .. } => "E_REJECTED",
            Self::Malformed(_) => "E_MALFORMED_RESPONSE",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

// =============================================================================
// SUBSCRIPTIONS
// =============================================================================

/// Callback invoked for every session change the backend observes.
pub type SessionListener = Arc<dyn Fn(SessionChange) + Send + Sync>;

/// Registration returned by [`IdentityBackend::on_session_change`].
///
/// Cancelling is idempotent; dropping the handle cancels it.
#[must_use = "dropping a subscription handle cancels the subscription"]
pub struct SubscriptionHandle {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl SubscriptionHandle {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self { cancel: Some(Box::new(cancel)) }
    }

    /// Unregister the listener. Takes effect before this returns.
    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_none()
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle").field("cancelled", &self.is_cancelled()).finish()
    }
}

// =============================================================================
// BACKEND TRAIT
// =============================================================================

/// Provider-neutral identity and data backend. Enables mocking in tests.
#[async_trait::async_trait]
pub trait IdentityBackend: Send + Sync {
    /// Current session, if the user agent holds one.
    ///
    /// # Errors
    ///
    /// Returns a [`BackendError`] if the lookup itself fails.
    async fn current_session(&self) -> Result<Option<Session>, BackendError>;

    /// Register `listener` for every later session change.
    fn on_session_change(&self, listener: SessionListener) -> SubscriptionHandle;

    /// Start a federated flow and return the URL to send the user agent to.
    ///
    /// # Errors
    ///
    /// Returns a [`BackendError`] if the flow cannot be started.
    async fn sign_in_federated(&self, provider: OAuthProvider, redirect_to: &str) -> Result<String, BackendError>;

    /// # Errors
    ///
    /// Returns [`BackendError::Rejected`] for bad credentials.
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<(), BackendError>;

    /// Send a one-time sign-in link to `email`.
    ///
    /// # Errors
    ///
    /// Returns a [`BackendError`] if delivery cannot be triggered.
    async fn sign_in_with_otp(&self, email: &str, redirect_to: &str) -> Result<(), BackendError>;

    /// # Errors
    ///
    /// Returns a [`BackendError`] if the backend could not revoke the session.
    async fn sign_out(&self) -> Result<(), BackendError>;

    /// Credit balance record for `identity_id`.
    ///
    /// # Errors
    ///
    /// Returns a [`BackendError`] if the lookup fails.
    async fn balance(&self, identity_id: Uuid) -> Result<Option<u64>, BackendError>;

    /// Subscription tier record for `identity_id`.
    ///
    /// # Errors
    ///
    /// Returns a [`BackendError`] if the lookup fails.
    async fn subscription_tier(&self, identity_id: Uuid) -> Result<Option<SubscriptionTier>, BackendError>;
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
