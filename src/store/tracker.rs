//! Session tracker: initial lookup and the change-notification worker.
//!
//! DESIGN
//! ======
//! The backend listener only forwards notifications into an unbounded
//! channel. A single worker drains it in arrival order and finishes each
//! notification (session write plus entitlement load or reset) before
//! taking the next one.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::SessionStore;
use crate::backend::{IdentityBackend, SessionListener};
use crate::error::ErrorCode;
use crate::types::SessionChange;

impl SessionStore {
    /// Attach `backend`: register the change listener and start the initial
    /// session lookup. Must be called from within a tokio runtime. A second
    /// call, or a call after shutdown, is ignored.
    pub fn connect(&self, backend: Arc<dyn IdentityBackend>) {
        let mut control = self.shared.control();
        if control.torn_down || control.backend.is_some() {
            warn!("connect ignored: store already connected or shut down");
            return;
        }

        let (tx, rx) = mpsc::unbounded_channel::<SessionChange>();
        let listener: SessionListener = Arc::new(move |change| {
            let _ = tx.send(change);
        });
        control.subscription = Some(backend.on_session_change(listener));
        control.backend = Some(Arc::clone(&backend));

        let expected_writes = control.session_writes;
        let worker = tokio::spawn(self.clone().process_changes(Arc::clone(&backend), rx));
        let init = tokio::spawn(self.clone().initialize(backend, expected_writes));
        control.tasks.extend([worker, init]);
        info!("session store connected");
    }

    /// First resolution of session state. Always ends initialization, even
    /// when the lookup fails.
    async fn initialize(self, backend: Arc<dyn IdentityBackend>, expected_writes: u64) {
        let session = match backend.current_session().await {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, code = e.error_code(), "initial session lookup failed; treating as signed out");
                None
            }
        };

        if let Some(activation) = self.apply_session(session, Some(expected_writes)) {
            self.refresh_entitlement(backend.as_ref(), activation).await;
        }

        if self.finish_initializing() {
            let state = self.snapshot();
            info!(signed_in = state.is_signed_in(), "session store initialized");
        }
    }

    async fn process_changes(self, backend: Arc<dyn IdentityBackend>, mut rx: mpsc::UnboundedReceiver<SessionChange>) {
        while let Some(change) = rx.recv().await {
            self.handle_change(backend.as_ref(), change).await;
        }
        debug!("session change stream closed");
    }

    async fn handle_change(&self, backend: &dyn IdentityBackend, change: SessionChange) {
        let identity_id = change.session.as_ref().map(|s| s.user.id);
        debug!(event = ?change.event, ?identity_id, "session change");

        let Some(activation) = self.apply_session(change.session, None) else {
            return;
        };
        self.refresh_entitlement(backend, activation).await;
    }
}
