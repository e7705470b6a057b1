//! Entitlement loader: credit balance and subscription tier for the active
//! identity.
//!
//! ERROR HANDLING
//! ==============
//! The two lookups are independent. A failed or empty lookup leaves its
//! field untouched and never reaches the caller; the other lookup still
//! applies. Failures are logged here and nowhere else.

use tracing::{debug, warn};
use uuid::Uuid;

use super::{Activation, SessionStore};
use crate::backend::IdentityBackend;
use crate::error::ErrorCode;
use crate::types::{EntitlementSnapshot, SubscriptionTier};

/// Outcome of one load. `None` fields mean "keep the prior value".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntitlementUpdate {
    pub credits: Option<u64>,
    pub subscription_tier: Option<SubscriptionTier>,
}

impl EntitlementUpdate {
    /// Merge into `snapshot`. Returns `true` if anything changed.
    pub fn apply_to(self, snapshot: &mut EntitlementSnapshot) -> bool {
        let before = *snapshot;
        if let Some(credits) = self.credits {
            snapshot.credits = credits;
        }
        if let Some(tier) = self.subscription_tier {
            snapshot.subscription_tier = tier;
        }
        before != *snapshot
    }
}

/// Run both lookups for `identity_id` concurrently.
pub async fn load_entitlement(backend: &dyn IdentityBackend, identity_id: Uuid) -> EntitlementUpdate {
    let (balance, tier) = tokio::join!(backend.balance(identity_id), backend.subscription_tier(identity_id));

    let credits = balance.unwrap_or_else(|e| {
        warn!(error = %e, code = e.error_code(), %identity_id, "credit balance lookup failed");
        None
    });
    let subscription_tier = tier.unwrap_or_else(|e| {
        warn!(error = %e, code = e.error_code(), %identity_id, "subscription tier lookup failed");
        None
    });

    EntitlementUpdate { credits, subscription_tier }
}

impl SessionStore {
    /// Reload the entitlement of the signed-in identity. Does nothing when
    /// no identity is active or the store is not connected.
    pub async fn refresh_credits(&self) {
        let Some(backend) = self.backend() else {
            debug!("refresh_credits ignored: store not connected");
            return;
        };
        let Some(activation) = self.current_activation() else {
            debug!("refresh_credits ignored: no active identity");
            return;
        };
        self.refresh_entitlement(backend.as_ref(), activation).await;
    }

    /// Load for `activation` and commit unless it went stale meanwhile.
    pub(crate) async fn refresh_entitlement(&self, backend: &dyn IdentityBackend, activation: Activation) {
        let Some(identity_id) = activation.identity_id else {
            return;
        };
        let update = load_entitlement(backend, identity_id).await;
        if self.apply_entitlement(activation, update) {
            debug!(%identity_id, "entitlement updated");
        }
    }
}

#[cfg(test)]
#[path = "entitlement_test.rs"]
mod tests;
