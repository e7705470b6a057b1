//! `SessionStore`: the single source of truth for identity, session and
//! entitlement.
//!
//! ARCHITECTURE
//! ============
//! One store instance is built at the application root and handed down by
//! clone. It composes three parts that share one state record:
//! - `tracker`: initial session lookup plus the change-notification worker
//! - `entitlement`: balance/tier loading for the active identity
//! - `gateway`: sign-in and sign-out operations
//!
//! CONSISTENCY
//! ===========
//! Every write goes through one mutex that also holds the staleness token.
//! The token advances whenever the active identity changes or the user signs
//! out; async work captures it up front and its result is dropped if the
//! token has moved by the time it resolves. Observers read through a
//! `watch` channel and only ever see committed states.
//!
//! LIFECYCLE
//! =========
//! `new` → `connect` → `shutdown`. Before `connect` (and after `shutdown`)
//! every operation is a no-op or reports `AuthError::NotInitialized`.
//! `shutdown` must be called to release the backend listener.

pub mod entitlement;
pub mod gateway;
mod tracker;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

pub use gateway::{AuthError, AuthOutcome, RedirectInitiated};

use crate::backend::{IdentityBackend, SubscriptionHandle};
use crate::config::StoreConfig;
use crate::types::{EntitlementSnapshot, Session, StoreState};

use entitlement::EntitlementUpdate;

// =============================================================================
// CONTROL STATE
// =============================================================================

/// Bookkeeping that must change atomically with `StoreState`.
#[derive(Default)]
struct Control {
    backend: Option<Arc<dyn IdentityBackend>>,
    torn_down: bool,
    /// Staleness token. Advances on identity change and sign-out.
    token: u64,
    /// Count of session writes, used to drop a late initial lookup.
    session_writes: u64,
    subscription: Option<SubscriptionHandle>,
    tasks: Vec<JoinHandle<()>>,
}

/// Identity that was active when some async work started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Activation {
    token: u64,
    identity_id: Option<Uuid>,
}

struct Shared {
    config: StoreConfig,
    state: watch::Sender<StoreState>,
    control: Mutex<Control>,
}

impl Shared {
    fn control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// =============================================================================
// SESSION STORE
// =============================================================================

/// Shared handle to the session store. Clones refer to the same store.
#[derive(Clone)]
pub struct SessionStore {
    shared: Arc<Shared>,
}

impl SessionStore {
    #[must_use]
    pub fn new(config: StoreConfig) -> Self {
        let (state, _) = watch::channel(StoreState::initializing());
        Self { shared: Arc::new(Shared { config, state, control: Mutex::new(Control::default()) }) }
    }

    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.shared.config
    }

    /// Current committed state.
    #[must_use]
    pub fn snapshot(&self) -> StoreState {
        self.shared.state.borrow().clone()
    }

    /// Receiver that observes every committed state.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<StoreState> {
        self.shared.state.subscribe()
    }

    /// Wait for the first session resolution and return the state at that
    /// point. Never resolves if the store is shut down before then.
    pub async fn wait_until_initialized(&self) -> StoreState {
        let mut rx = self.subscribe();
        match rx.wait_for(|state| !state.is_initializing).await {
            Ok(state) => state.clone(),
            Err(_) => self.snapshot(),
        }
    }

    /// `true` once connected and until shut down.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.backend().is_some()
    }

    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shared.control().torn_down
    }

    /// Tear the store down: cancel the backend listener, abort background
    /// work and freeze the state. Idempotent.
    pub fn shutdown(&self) {
        let (subscription, tasks) = {
            let mut control = self.shared.control();
            if control.torn_down {
                return;
            }
            control.torn_down = true;
            control.backend = None;
            (control.subscription.take(), std::mem::take(&mut control.tasks))
        };
        if let Some(mut subscription) = subscription {
            subscription.cancel();
        }
        for task in tasks {
            task.abort();
        }
        info!("session store shut down");
    }

    // =========================================================================
    // GUARDED WRITES
    // =========================================================================

    fn backend(&self) -> Option<Arc<dyn IdentityBackend>> {
        let control = self.shared.control();
        if control.torn_down { None } else { control.backend.clone() }
    }

    /// Active identity with the current staleness token, if signed in.
    fn current_activation(&self) -> Option<Activation> {
        let control = self.shared.control();
        if control.torn_down {
            return None;
        }
        let identity_id = self.shared.state.borrow().identity_id()?;
        Some(Activation { token: control.token, identity_id: Some(identity_id) })
    }

    /// Install `session` as the tracked session. With `expected_writes`, the
    /// write is skipped if any other session write happened since.
    ///
    /// A changed identity advances the token and resets the entitlement in
    /// the same commit, so no observer sees the new identity with the
    /// previous identity's values.
    fn apply_session(&self, session: Option<Session>, expected_writes: Option<u64>) -> Option<Activation> {
        let mut control = self.shared.control();
        if control.torn_down {
            return None;
        }
        if expected_writes.is_some_and(|w| w != control.session_writes) {
            debug!("initial session superseded by a later change; discarding");
            return None;
        }

        control.session_writes += 1;
        let mut activation = None;
        self.shared.state.send_modify(|state| {
            let identity_changed = state.set_session(session);
            if identity_changed || state.identity.is_none() {
                control.token += 1;
                state.entitlement = EntitlementSnapshot::default();
            }
            activation = Some(Activation { token: control.token, identity_id: state.identity_id() });
        });
        activation
    }

    /// Apply a finished entitlement load if its activation is still current.
    fn apply_entitlement(&self, activation: Activation, update: EntitlementUpdate) -> bool {
        let control = self.shared.control();
        if control.torn_down || control.token != activation.token {
            debug!(identity_id = ?activation.identity_id, "discarding stale entitlement result");
            return false;
        }
        self.shared.state.send_if_modified(|state| update.apply_to(&mut state.entitlement))
    }

    /// Drop identity, session and entitlement locally.
    fn clear_local(&self) {
        let mut control = self.shared.control();
        if control.torn_down {
            return;
        }
        control.token += 1;
        control.session_writes += 1;
        self.shared.state.send_modify(StoreState::clear);
    }

    /// Flip `is_initializing` off. Only the first call has any effect.
    fn finish_initializing(&self) -> bool {
        let control = self.shared.control();
        if control.torn_down {
            return false;
        }
        self.shared.state.send_if_modified(|state| std::mem::replace(&mut state.is_initializing, false))
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("config", &self.shared.config)
            .field("state", &*self.shared.state.borrow())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================

#[cfg(test)]
pub(crate) mod test_helpers;

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
