// Process-wide subscription read model shared with UI collaborators
// Mutations stay inside the crate; collaborators read snapshots or watch for changes

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use super::permission::PermissionState;

/// Snapshot of the subscription pipeline as seen by UI collaborators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionState {
    /// Platform exposes every capability the pipeline needs; fixed at startup
    pub supported: bool,
    /// Mirror of the platform permission primitive
    pub permission: PermissionState,
    /// A delivery token is registered with the backend registry
    pub subscribed: bool,
    /// An acquire-and-register operation is in flight
    pub registering: bool,
    /// When the registry last accepted this device's token
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl SubscriptionState {
    fn initial(supported: bool, permission: PermissionState) -> Self {
        Self {
            supported,
            permission,
            subscribed: false,
            registering: false,
            last_synced_at: None,
        }
    }
}

/// Single owned state store for one agent session.
///
/// Cloning the store clones a handle; all clones observe and mutate the same
/// state. Mutators are crate-private so only the pipeline operations change it.
#[derive(Debug, Clone)]
pub struct SubscriptionStore {
    tx: Arc<watch::Sender<SubscriptionState>>,
}

impl SubscriptionStore {
    pub fn new(supported: bool, permission: PermissionState) -> Self {
        let (tx, _rx) = watch::channel(SubscriptionState::initial(supported, permission));
        Self { tx: Arc::new(tx) }
    }

    pub fn snapshot(&self) -> SubscriptionState {
        self.tx.borrow().clone()
    }

    /// Receiver notified on every state change
    pub fn watch(&self) -> watch::Receiver<SubscriptionState> {
        self.tx.subscribe()
    }

    pub fn is_supported(&self) -> bool {
        self.tx.borrow().supported
    }

    pub fn permission(&self) -> PermissionState {
        self.tx.borrow().permission
    }

    pub fn is_subscribed(&self) -> bool {
        self.tx.borrow().subscribed
    }

    pub fn is_registering(&self) -> bool {
        self.tx.borrow().registering
    }

    pub(crate) fn set_permission(&self, permission: PermissionState) {
        self.tx.send_if_modified(|state| {
            if state.permission == permission {
                return false;
            }
            tracing::debug!(from = %state.permission, to = %permission, "Permission changed");
            state.permission = permission;
            true
        });
    }

    pub(crate) fn set_subscribed(&self, subscribed: bool) {
        self.tx.send_if_modified(|state| {
            if state.subscribed == subscribed {
                return false;
            }
            state.subscribed = subscribed;
            true
        });
    }

    /// Registry accepted the token
    pub(crate) fn mark_synced(&self) {
        self.tx.send_modify(|state| {
            state.subscribed = true;
            state.last_synced_at = Some(Utc::now());
        });
    }

    /// Claim the registration slot. Returns `None` while another caller holds it.
    pub(crate) fn try_begin_registration(&self) -> Option<RegistrationGuard> {
        let mut claimed = false;
        self.tx.send_if_modified(|state| {
            if state.registering {
                return false;
            }
            state.registering = true;
            claimed = true;
            true
        });
        claimed.then(|| RegistrationGuard {
            store: self.clone(),
        })
    }

    /// Wait until no registration is in flight and return the resulting state
    pub(crate) async fn wait_for_registration(&self) -> SubscriptionState {
        let mut rx = self.watch();
        match rx.wait_for(|state| !state.registering).await {
            Ok(state) => state.clone(),
            Err(_) => self.snapshot(),
        }
    }

    fn end_registration(&self) {
        self.tx.send_if_modified(|state| {
            let was_registering = state.registering;
            state.registering = false;
            was_registering
        });
    }
}

/// Holds the `registering` flag; releasing it on drop covers every early return
#[derive(Debug)]
pub struct RegistrationGuard {
    store: SubscriptionStore,
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        self.store.end_registration();
    }
}
