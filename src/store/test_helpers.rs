//! Shared fixtures for store tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use uuid::Uuid;

use super::SessionStore;
use crate::backend::memory::MemoryBackend;
use crate::backend::{BackendError, IdentityBackend, SessionListener, SubscriptionHandle};
use crate::config::StoreConfig;
use crate::types::{OAuthProvider, Session, StoreState, SubscriptionTier};

const WAIT_LIMIT: Duration = Duration::from_secs(2);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// A `MemoryBackend` whose read responses can be held in flight so tests can
/// interleave operations with pending lookups. The value is read before the
/// gate, so a held response reflects the data at call time.
pub struct GatedBackend {
    pub inner: MemoryBackend,
    session_gate: watch::Sender<bool>,
    lookup_gate: watch::Sender<bool>,
    waiting: AtomicUsize,
}

impl GatedBackend {
    pub fn new(inner: MemoryBackend) -> Arc<Self> {
        Arc::new(Self {
            inner,
            session_gate: watch::channel(true).0,
            lookup_gate: watch::channel(true).0,
            waiting: AtomicUsize::new(0),
        })
    }

    pub fn hold_session(&self) {
        self.session_gate.send_replace(false);
    }

    pub fn release_session(&self) {
        self.session_gate.send_replace(true);
    }

    pub fn hold_lookups(&self) {
        self.lookup_gate.send_replace(false);
    }

    pub fn release_lookups(&self) {
        self.lookup_gate.send_replace(true);
    }

    /// Number of calls currently parked at a gate.
    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    /// Yield until at least `n` calls are parked.
    pub async fn wait_for_parked(&self, n: usize) {
        tokio::time::timeout(WAIT_LIMIT, async {
            while self.waiting() < n {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("gated calls never parked");
    }

    async fn pass(&self, gate: &watch::Sender<bool>) {
        let mut rx = gate.subscribe();
        if *rx.borrow() {
            return;
        }
        self.waiting.fetch_add(1, Ordering::SeqCst);
        let _ = rx.wait_for(|open| *open).await;
        self.waiting.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl IdentityBackend for GatedBackend {
    async fn current_session(&self) -> Result<Option<Session>, BackendError> {
        let result = self.inner.current_session().await;
        self.pass(&self.session_gate).await;
        result
    }

    fn on_session_change(&self, listener: SessionListener) -> SubscriptionHandle {
        self.inner.on_session_change(listener)
    }

    async fn sign_in_federated(&self, provider: OAuthProvider, redirect_to: &str) -> Result<String, BackendError> {
        self.inner.sign_in_federated(provider, redirect_to).await
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<(), BackendError> {
        self.inner.sign_in_with_password(email, password).await
    }

    async fn sign_in_with_otp(&self, email: &str, redirect_to: &str) -> Result<(), BackendError> {
        self.inner.sign_in_with_otp(email, redirect_to).await
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        self.inner.sign_out().await
    }

    async fn balance(&self, identity_id: Uuid) -> Result<Option<u64>, BackendError> {
        let result = self.inner.balance(identity_id).await;
        self.pass(&self.lookup_gate).await;
        result
    }

    async fn subscription_tier(&self, identity_id: Uuid) -> Result<Option<SubscriptionTier>, BackendError> {
        let result = self.inner.subscription_tier(identity_id).await;
        self.pass(&self.lookup_gate).await;
        result
    }
}

/// Store connected to `backend` with default config.
pub fn connected_store(backend: Arc<dyn IdentityBackend>) -> SessionStore {
    init_tracing();
    let store = SessionStore::new(StoreConfig::default());
    store.connect(backend);
    store
}

/// Wait until the committed state satisfies `pred`, returning it.
pub async fn wait_for_state(store: &SessionStore, pred: impl Fn(&StoreState) -> bool) -> StoreState {
    let mut rx = store.subscribe();
    tokio::time::timeout(WAIT_LIMIT, rx.wait_for(|s| pred(s)))
        .await
        .expect("state condition not reached in time")
        .expect("state sender dropped")
        .clone()
}

/// Let spawned tasks run until nothing is immediately ready.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}
