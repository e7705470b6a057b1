//! authsync: session and entitlement synchronization for a UI tree.
//!
//! ARCHITECTURE
//! ============
//! A single [`SessionStore`] owns "who is signed in, with what session, how
//! many credits remain and which subscription tier applies". It mirrors an
//! external identity provider through the [`IdentityBackend`] trait and
//! exposes one observable [`StoreState`] plus the sign-in/sign-out actions.
//!
//! Build one store at the application root, `connect` it to a backend, and
//! pass clones down explicitly. There is no global instance.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use authsync::backend::memory::MemoryBackend;
//! use authsync::{SessionStore, StoreConfig};
//!
//! # async fn run() -> Result<(), authsync::config::ConfigError> {
//! let store = SessionStore::new(StoreConfig::from_env()?);
//! store.connect(Arc::new(MemoryBackend::new()));
//! let state = store.wait_until_initialized().await;
//! println!("signed in: {}, credits: {}", state.is_signed_in(), state.credits());
//! store.shutdown();
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod store;
pub mod types;

pub use backend::{BackendError, IdentityBackend, SessionListener, SubscriptionHandle};
pub use config::StoreConfig;
pub use error::{ErrorCode, ErrorDescriptor};
pub use store::{AuthError, AuthOutcome, RedirectInitiated, SessionStore};
pub use types::{
    AuthChangeEvent, EntitlementSnapshot, Identity, OAuthProvider, Session, SessionChange, StoreState,
    SubscriptionTier,
};
