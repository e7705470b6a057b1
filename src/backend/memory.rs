//! In-process identity backend.
//!
//! ARCHITECTURE
//! ============
//! `MemoryBackend` keeps accounts, balances, tiers and the current session in
//! one mutex-guarded record. Sign-in flows that would normally finish in a
//! browser redirect (federated, one-time link) are completed explicitly with
//! `complete_*` calls, which then push the change notification exactly like a
//! hosted provider would.
//!
//! Listeners are invoked synchronously on the calling task, after the lock is
//! released, so a listener may call back into the backend.

use std::collections::{HashMap, HashSet};
use std::fmt::Write;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use rand::Rng;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{BackendError, IdentityBackend, SessionListener, SubscriptionHandle};
use crate::types::{AuthChangeEvent, Identity, OAuthProvider, Session, SessionChange, SubscriptionTier};

const AUTHORIZE_URL: &str = "https://auth.invalid/authorize";
const SESSION_TTL: time::Duration = time::Duration::hours(1);

pub(crate) fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

/// Generate a random 32-byte hex token.
#[must_use]
pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    bytes_to_hex(&bytes)
}

/// Per-call-family fault injection. A set flag makes that call fail with
/// [`BackendError::Unavailable`].
#[derive(Debug, Clone, Copy, Default)]
struct Faults {
    session_lookup: bool,
    balance_lookup: bool,
    tier_lookup: bool,
    sign_out: bool,
}

struct Account {
    identity: Identity,
    password: Option<String>,
}

struct Inner {
    /// Accounts keyed by lowercased email.
    accounts: HashMap<String, Account>,
    balances: HashMap<Uuid, u64>,
    tiers: HashMap<Uuid, SubscriptionTier>,
    disabled_providers: HashSet<OAuthProvider>,
    /// Outstanding one-time links: email -> token.
    pending_links: HashMap<String, String>,
    current: Option<Session>,
    listeners: HashMap<u64, SessionListener>,
    next_listener_id: u64,
    faults: Faults,
}

/// Identity backend over in-process maps.
#[derive(Clone)]
pub struct MemoryBackend {
    inner: Arc<Mutex<Inner>>,
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

fn issue_session(identity: &Identity) -> Session {
    Session {
        access_token: generate_token(),
        refresh_token: generate_token(),
        expires_at: OffsetDateTime::now_utc() + SESSION_TTL,
        user: identity.clone(),
    }
}

fn unavailable(call: &str) -> BackendError {
    BackendError::Unavailable(format!("{call}: injected fault"))
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                accounts: HashMap::new(),
                balances: HashMap::new(),
                tiers: HashMap::new(),
                disabled_providers: HashSet::new(),
                pending_links: HashMap::new(),
                current: None,
                listeners: HashMap::new(),
                next_listener_id: 0,
                faults: Faults::default(),
            })),
        }
    }

    // =========================================================================
    // SEEDING
    // =========================================================================

    /// Register a password account, or reset the password of an existing one.
    pub fn register_user(&self, email: &str, password: &str) -> Identity {
        let mut inner = lock(&self.inner);
        let account = Self::account_entry(&mut inner, email);
        account.password = Some(password.to_string());
        account.identity.clone()
    }

    pub fn set_balance(&self, identity_id: Uuid, balance: u64) {
        lock(&self.inner).balances.insert(identity_id, balance);
    }

    pub fn remove_balance(&self, identity_id: Uuid) {
        lock(&self.inner).balances.remove(&identity_id);
    }

    pub fn set_tier(&self, identity_id: Uuid, tier: SubscriptionTier) {
        lock(&self.inner).tiers.insert(identity_id, tier);
    }

    pub fn disable_provider(&self, provider: OAuthProvider) {
        lock(&self.inner).disabled_providers.insert(provider);
    }

    /// Install a session as if restored from the user agent's storage.
    /// No notification is sent.
    pub fn restore_session(&self, session: Option<Session>) {
        lock(&self.inner).current = session;
    }

    pub fn fail_session_lookup(&self, fail: bool) {
        lock(&self.inner).faults.session_lookup = fail;
    }

    pub fn fail_balance_lookup(&self, fail: bool) {
        lock(&self.inner).faults.balance_lookup = fail;
    }

    pub fn fail_tier_lookup(&self, fail: bool) {
        lock(&self.inner).faults.tier_lookup = fail;
    }

    pub fn fail_sign_out(&self, fail: bool) {
        lock(&self.inner).faults.sign_out = fail;
    }

    // =========================================================================
    // INSPECTION
    // =========================================================================

    #[must_use]
    pub fn current(&self) -> Option<Session> {
        lock(&self.inner).current.clone()
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        lock(&self.inner).listeners.len()
    }

    /// Token of the outstanding one-time link for `email`, if one was sent.
    #[must_use]
    pub fn pending_link(&self, email: &str) -> Option<String> {
        lock(&self.inner).pending_links.get(&normalize_email(email)).cloned()
    }

    // =========================================================================
    // FLOW COMPLETION
    // =========================================================================

    /// Finish a federated flow as the redirect-back would, provisioning the
    /// account on first use.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Rejected`] if the provider is disabled.
    pub fn complete_federated_sign_in(&self, provider: OAuthProvider, email: &str) -> Result<Session, BackendError> {
        let session = {
            let mut inner = lock(&self.inner);
            if inner.disabled_providers.contains(&provider) {
                return Err(provider_disabled(provider));
            }
            let identity = Self::account_entry(&mut inner, email).identity.clone();
            let session = issue_session(&identity);
            inner.current = Some(session.clone());
            session
        };
        self.emit(SessionChange::signed_in(session.clone()));
        Ok(session)
    }

    /// Follow a one-time link. The token is consumed on success.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Rejected`] if no matching link is outstanding.
    pub fn complete_link_sign_in(&self, email: &str, token: &str) -> Result<Session, BackendError> {
        let session = {
            let mut inner = lock(&self.inner);
            let key = normalize_email(email);
            if inner.pending_links.get(&key).map(String::as_str) != Some(token) {
                return Err(BackendError::rejected("otp_expired", "Email link is invalid or has expired"));
            }
            inner.pending_links.remove(&key);
            let identity = Self::account_entry(&mut inner, email).identity.clone();
            let session = issue_session(&identity);
            inner.current = Some(session.clone());
            session
        };
        self.emit(SessionChange::signed_in(session.clone()));
        Ok(session)
    }

    /// Push `change` to every listener and make its session current.
    pub fn emit(&self, change: SessionChange) {
        let listeners: Vec<SessionListener> = {
            let mut inner = lock(&self.inner);
            inner.current.clone_from(&change.session);
            inner.listeners.values().cloned().collect()
        };
        for listener in listeners {
            listener(change.clone());
        }
    }

    fn account_entry<'a>(inner: &'a mut Inner, email: &str) -> &'a mut Account {
        let key = normalize_email(email);
        inner.accounts.entry(key.clone()).or_insert_with(|| Account {
            identity: Identity {
                id: Uuid::new_v4(),
                display_name: key.split('@').next().map(str::to_string),
                email: Some(key),
                avatar_url: None,
            },
            password: None,
        })
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn provider_disabled(provider: OAuthProvider) -> BackendError {
    BackendError::rejected("provider_disabled", format!("Unsupported provider: {provider} is not enabled"))
}

fn remove_listener(inner: &Weak<Mutex<Inner>>, id: u64) {
    if let Some(inner) = inner.upgrade() {
        lock(&inner).listeners.remove(&id);
    }
}

#[async_trait::async_trait]
impl IdentityBackend for MemoryBackend {
    async fn current_session(&self) -> Result<Option<Session>, BackendError> {
        let inner = lock(&self.inner);
        if inner.faults.session_lookup {
            return Err(unavailable("current_session"));
        }
        Ok(inner.current.clone())
    }

    fn on_session_change(&self, listener: SessionListener) -> SubscriptionHandle {
        let id = {
            let mut inner = lock(&self.inner);
            let id = inner.next_listener_id;
            inner.next_listener_id += 1;
            inner.listeners.insert(id, listener);
            id
        };
        let weak = Arc::downgrade(&self.inner);
        SubscriptionHandle::new(move || remove_listener(&weak, id))
    }

    async fn sign_in_federated(&self, provider: OAuthProvider, redirect_to: &str) -> Result<String, BackendError> {
        if lock(&self.inner).disabled_providers.contains(&provider) {
            return Err(provider_disabled(provider));
        }
        Ok(format!("{AUTHORIZE_URL}?provider={provider}&redirect_to={redirect_to}"))
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<(), BackendError> {
        let session = {
            let mut inner = lock(&self.inner);
            let account = inner.accounts.get(&normalize_email(email));
            let Some(account) = account.filter(|a| a.password.as_deref() == Some(password)) else {
                return Err(BackendError::rejected("invalid_credentials", "Invalid login credentials"));
            };
            let session = issue_session(&account.identity);
            inner.current = Some(session.clone());
            session
        };
        self.emit(SessionChange::signed_in(session));
        Ok(())
    }

    async fn sign_in_with_otp(&self, email: &str, _redirect_to: &str) -> Result<(), BackendError> {
        let key = normalize_email(email);
        if !key.contains('@') {
            return Err(BackendError::rejected("validation_failed", "Unable to validate email address"));
        }
        lock(&self.inner).pending_links.insert(key, generate_token());
        Ok(())
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        if lock(&self.inner).faults.sign_out {
            return Err(unavailable("sign_out"));
        }
        self.emit(SessionChange { event: AuthChangeEvent::SignedOut, session: None });
        Ok(())
    }

    async fn balance(&self, identity_id: Uuid) -> Result<Option<u64>, BackendError> {
        let inner = lock(&self.inner);
        if inner.faults.balance_lookup {
            return Err(unavailable("balance"));
        }
        Ok(inner.balances.get(&identity_id).copied())
    }

    async fn subscription_tier(&self, identity_id: Uuid) -> Result<Option<SubscriptionTier>, BackendError> {
        let inner = lock(&self.inner);
        if inner.faults.tier_lookup {
            return Err(unavailable("subscription_tier"));
        }
        Ok(inner.tiers.get(&identity_id).copied())
    }
}

#[cfg(test)]
#[path = "memory_test.rs"]
mod tests;
