//! Identity, session and entitlement data shared by the store and backends.
//!
//! DESIGN
//! ======
//! `StoreState` is the single record consumers observe. Identity is never
//! stored on its own: it is always the `user` of the current `Session`, so
//! the two cannot disagree.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

// =============================================================================
// IDENTITY + SESSION
// =============================================================================

/// Backend-owned user reference. The store holds a read-only copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

/// Time-bounded credential grant for an [`Identity`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(with = "time::serde::timestamp")]
    pub expires_at: OffsetDateTime,
    pub user: Identity,
}

impl Session {
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expires_at <= now
    }
}

// Tokens stay out of logs.
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .finish()
    }
}

// =============================================================================
// ENUMS
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    #[default]
    Free,
    Starter,
    Pro,
    Enterprise,
}

impl SubscriptionTier {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Starter => "starter",
            Self::Pro => "pro",
            Self::Enterprise => "enterprise",
        }
    }
}

impl FromStr for SubscriptionTier {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(Self::Free),
            "starter" => Ok(Self::Starter),
            "pro" => Ok(Self::Pro),
            "enterprise" => Ok(Self::Enterprise),
            other => Err(ParseEnumError { kind: "subscription tier", value: other.to_string() }),
        }
    }
}

impl fmt::Display for SubscriptionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Third-party providers accepted for federated sign-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OAuthProvider {
    Google,
    Github,
    Apple,
    Azure,
    Discord,
}

impl OAuthProvider {
    pub const ALL: [Self; 5] = [Self::Google, Self::Github, Self::Apple, Self::Azure, Self::Discord];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Github => "github",
            Self::Apple => "apple",
            Self::Azure => "azure",
            Self::Discord => "discord",
        }
    }
}

impl FromStr for OAuthProvider {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| ParseEnumError { kind: "oauth provider", value: s.to_string() })
    }
}

impl fmt::Display for OAuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// CHANGE NOTIFICATIONS
// =============================================================================

/// Why the backend pushed a session change. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthChangeEvent {
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
}

/// A single backend notification. `session` is authoritative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionChange {
    pub event: AuthChangeEvent,
    pub session: Option<Session>,
}

impl SessionChange {
    #[must_use]
    pub fn signed_in(session: Session) -> Self {
        Self { event: AuthChangeEvent::SignedIn, session: Some(session) }
    }

    #[must_use]
    pub fn signed_out() -> Self {
        Self { event: AuthChangeEvent::SignedOut, session: None }
    }
}

// =============================================================================
// STORE STATE
// =============================================================================

/// Usage facts derived for the active identity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitlementSnapshot {
    pub credits: u64,
    pub subscription_tier: SubscriptionTier,
}

/// Everything a UI tree reads about the current user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreState {
    pub identity: Option<Identity>,
    pub session: Option<Session>,
    pub entitlement: EntitlementSnapshot,
    pub is_initializing: bool,
}

impl StoreState {
    /// State before the first session lookup resolves.
    #[must_use]
    pub fn initializing() -> Self {
        Self { identity: None, session: None, entitlement: EntitlementSnapshot::default(), is_initializing: true }
    }

    #[must_use]
    pub fn credits(&self) -> u64 {
        self.entitlement.credits
    }

    #[must_use]
    pub fn subscription_tier(&self) -> SubscriptionTier {
        self.entitlement.subscription_tier
    }

    #[must_use]
    pub fn is_signed_in(&self) -> bool {
        self.identity.is_some()
    }

    /// Identity id of the signed-in user, if any.
    #[must_use]
    pub fn identity_id(&self) -> Option<Uuid> {
        self.identity.as_ref().map(|i| i.id)
    }

    /// Replace session and identity together. Returns `true` when the
    /// identity id changed.
    pub(crate) fn set_session(&mut self, session: Option<Session>) -> bool {
        let previous = self.identity_id();
        self.identity = session.as_ref().map(|s| s.user.clone());
        self.session = session;
        previous != self.identity_id()
    }

    /// Drop identity, session and entitlement.
    pub(crate) fn clear(&mut self) {
        self.identity = None;
        self.session = None;
        self.entitlement = EntitlementSnapshot::default();
    }
}

impl Default for StoreState {
    fn default() -> Self {
        Self::initializing()
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================


#[cfg(test)]
#[path = "types_test.rs"]
mod tests;
