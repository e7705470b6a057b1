//! Action gateway: identity-changing operations exposed to the UI.
//!
//! ERROR HANDLING
//! ==============
//! Federated sign-in returns `Err` because a redirect has no continuation to
//! report into. Password and link sign-in return an [`AuthOutcome`] so the
//! caller gets the error as data for inline feedback. Sign-out never fails
//! from the caller's point of view: local state is cleared regardless of
//! what the backend says.
//!
//! None of these operations write the tracked session themselves (sign-out
//! excepted). A successful sign-in shows up through the backend's change
//! notification; watch `SessionStore::subscribe` for it.

use tracing::{info, warn};

use super::SessionStore;
use crate::backend::BackendError;
use crate::error::{ErrorCode, ErrorDescriptor};
use crate::types::OAuthProvider;

// =============================================================================
// ERRORS + OUTCOMES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("session store is not connected to a backend")]
    NotInitialized,
    #[error("invalid email address")]
    InvalidEmail,
    #[error("password is required")]
    MissingPassword,
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl ErrorCode for AuthError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotInitialized => "E_NOT_INITIALIZED",
            Self::InvalidEmail => "E_INVALID_EMAIL",
            Self::MissingPassword => "E_MISSING_PASSWORD",
            Self::Backend(e) => e.error_code(),
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Backend(e) => e.retryable(),
            _ => false,
        }
    }
}

/// Result of a sign-in request whose failure is reported as data.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum AuthOutcome {
    /// The backend accepted the request. State changes arrive separately.
    Accepted,
    Rejected(AuthError),
}

impl AuthOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }

    pub fn error(&self) -> Option<&AuthError> {
        match self {
            Self::Accepted => None,
            Self::Rejected(e) => Some(e),
        }
    }

    pub fn descriptor(&self) -> Option<ErrorDescriptor> {
        self.error().map(ErrorDescriptor::from_error)
    }

    /// # Errors
    ///
    /// Returns the carried [`AuthError`] for a rejected outcome.
    pub fn into_result(self) -> Result<(), AuthError> {
        match self {
            Self::Accepted => Ok(()),
            Self::Rejected(e) => Err(e),
        }
    }
}

impl From<Result<(), AuthError>> for AuthOutcome {
    fn from(result: Result<(), AuthError>) -> Self {
        match result {
            Ok(()) => Self::Accepted,
            Err(e) => Self::Rejected(e),
        }
    }
}

/// A federated flow was started; send the user agent to `url`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectInitiated {
    pub provider: OAuthProvider,
    pub url: String,
}

#[must_use]
pub fn normalize_email(email: &str) -> Option<String> {
    let normalized = email.trim().to_ascii_lowercase();
    let (local, domain) = normalized.split_once('@')?;
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return None;
    }
    Some(normalized)
}

// =============================================================================
// OPERATIONS
// =============================================================================

impl SessionStore {
    /// Start federated sign-in with `provider`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::NotInitialized`] before `connect`, or the
    /// backend's error if it refuses to start the flow.
    pub async fn sign_in(&self, provider: OAuthProvider) -> Result<RedirectInitiated, AuthError> {
        let backend = self.backend().ok_or(AuthError::NotInitialized)?;
        let redirect_to = self.shared.config.redirect_target();
        let url = backend
            .sign_in_federated(provider, &redirect_to)
            .await
            .inspect_err(|e| warn!(error = %e, %provider, "federated sign-in rejected"))?;
        info!(%provider, "federated sign-in redirect initiated");
        Ok(RedirectInitiated { provider, url })
    }

    /// Password sign-in. Never returns `Err`; failures come back as
    /// [`AuthOutcome::Rejected`].
    pub async fn sign_in_with_email(&self, email: &str, password: &str) -> AuthOutcome {
        let outcome = AuthOutcome::from(self.password_sign_in(email, password).await);
        if let Some(e) = outcome.error() {
            warn!(error = %e, code = e.error_code(), "password sign-in failed");
        }
        outcome
    }

    /// Request a one-time sign-in link for `email`.
    pub async fn sign_in_with_magic_link(&self, email: &str) -> AuthOutcome {
        let outcome = AuthOutcome::from(self.link_sign_in(email).await);
        if let Some(e) = outcome.error() {
            warn!(error = %e, code = e.error_code(), "magic link request failed");
        }
        outcome
    }

    /// Sign out locally and at the backend. Local state is cleared even if
    /// the backend call fails. No-op before `connect`.
    pub async fn sign_out(&self) {
        let Some(backend) = self.backend() else {
            tracing::debug!("sign_out ignored: store not connected");
            return;
        };

        self.clear_local();
        if let Err(e) = backend.sign_out().await {
            warn!(error = %e, code = e.error_code(), "backend sign-out failed; local session cleared anyway");
        }
        // Anything that slipped in while the backend call was pending predates the sign-out.
        self.clear_local();
        info!("signed out");
    }

    async fn password_sign_in(&self, email: &str, password: &str) -> Result<(), AuthError> {
        let backend = self.backend().ok_or(AuthError::NotInitialized)?;
        let email = normalize_email(email).ok_or(AuthError::InvalidEmail)?;
        if password.is_empty() {
            return Err(AuthError::MissingPassword);
        }
        backend.sign_in_with_password(&email, password).await?;
        Ok(())
    }

    async fn link_sign_in(&self, email: &str) -> Result<(), AuthError> {
        let backend = self.backend().ok_or(AuthError::NotInitialized)?;
        let email = normalize_email(email).ok_or(AuthError::InvalidEmail)?;
        let redirect_to = self.shared.config.redirect_target();
        backend.sign_in_with_otp(&email, &redirect_to).await?;
        info!("magic link requested");
        Ok(())
    }
}

#[cfg(test)]
#[path = "gateway_test.rs"]
mod tests;
