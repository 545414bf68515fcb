// Delivery token lifecycle: acquire, register, refresh and revoke
// Every operation resolves to a boolean outcome; errors end at a log entry

use std::sync::Arc;

use tokio::sync::Mutex;

use super::permission::PermissionNegotiator;
use super::platform::{PushProvider, SubscriptionRegistry};
use super::state::SubscriptionStore;
use super::worker::{WorkerHandle, WorkerRegistrationManager};
use super::{DeliveryToken, PushError, PushResult};

/// Owns the delivery token and its registration with the backend registry
pub struct TokenLifecycleManager {
    store: SubscriptionStore,
    negotiator: Arc<PermissionNegotiator>,
    worker: Arc<WorkerRegistrationManager>,
    provider: Arc<dyn PushProvider>,
    registry: Arc<dyn SubscriptionRegistry>,
    vapid_key: Option<String>,
    /// Held by every operation that touches the provider token or the registry
    sync: Mutex<()>,
}

impl TokenLifecycleManager {
    pub fn new(
        store: SubscriptionStore,
        negotiator: Arc<PermissionNegotiator>,
        worker: Arc<WorkerRegistrationManager>,
        provider: Arc<dyn PushProvider>,
        registry: Arc<dyn SubscriptionRegistry>,
        vapid_key: Option<String>,
    ) -> Self {
        Self {
            store,
            negotiator,
            worker,
            provider,
            registry,
            vapid_key,
            sync: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &SubscriptionStore {
        &self.store
    }

    fn ready_to_register(&self) -> bool {
        self.store.is_supported() && self.store.permission().is_granted()
    }

    /// Permission can be revoked while an operation waits for the sync lock
    fn ensure_granted(&self) -> PushResult<()> {
        if self.store.permission().is_granted() {
            Ok(())
        } else {
            Err(PushError::PermissionDenied)
        }
    }

    /// Acquire a token and register it with the backend.
    ///
    /// Requires granted permission; otherwise returns `false` without touching
    /// the worker or the network. A caller arriving while another subscribe is
    /// in flight waits for that attempt and returns its outcome.
    #[tracing::instrument(skip(self))]
    pub async fn subscribe(&self) -> bool {
        if !self.store.is_supported() {
            tracing::debug!("Push not supported; subscribe skipped");
            return false;
        }
        if !self.store.permission().is_granted() {
            tracing::debug!(permission = %self.store.permission(), "Permission not granted; subscribe skipped");
            return false;
        }

        let Some(_guard) = self.store.try_begin_registration() else {
            tracing::debug!("Subscription already in flight; waiting for its outcome");
            return self.store.wait_for_registration().await.subscribed;
        };
        let _sync = self.sync.lock().await;

        match self.acquire_and_register().await {
            Ok(token) => {
                tracing::info!(token = %token, "Push subscription registered");
                true
            },
            Err(e) => {
                tracing::error!(error = %e, "Push subscription failed");
                false
            },
        }
    }

    async fn acquire_and_register(&self) -> PushResult<DeliveryToken> {
        self.ensure_granted()?;
        let handle = self
            .worker
            .register_worker()
            .await
            .ok_or_else(|| PushError::registration("worker", "service worker unavailable"))?;

        if !self.worker.wait_ready(&handle).await {
            return Err(PushError::registration("worker", "service worker never became ready"));
        }

        let token = self.acquire_token(&handle).await?;
        self.registry.subscribe(&token).await?;
        self.store.mark_synced();
        Ok(token)
    }

    async fn acquire_token(&self, handle: &WorkerHandle) -> PushResult<DeliveryToken> {
        let server_key = self.server_key().await;
        match self.provider.get_token(handle, server_key.as_deref()).await? {
            Some(token) if !token.is_empty() => Ok(token),
            _ => Err(PushError::registration("token", "provider returned no delivery token")),
        }
    }

    /// Application server key for providers that still need one
    async fn server_key(&self) -> Option<String> {
        if !self.provider.requires_server_key() {
            return None;
        }
        if let Some(key) = &self.vapid_key {
            return Some(key.clone());
        }
        match self.registry.vapid_public_key().await {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to fetch VAPID public key; continuing without it");
                None
            },
        }
    }

    /// Revoke the current token at the provider and remove it from the registry.
    ///
    /// `subscribed` only flips to `false` once both sides agree.
    #[tracing::instrument(skip(self))]
    pub async fn unsubscribe(&self) -> bool {
        if !self.store.is_supported() {
            tracing::debug!("Push not supported; unsubscribe skipped");
            return false;
        }
        let _sync = self.sync.lock().await;

        let token = match self.provider.current_token().await {
            Ok(Some(token)) => token,
            Ok(None) => {
                tracing::debug!("No delivery token held; already unsubscribed");
                self.store.set_subscribed(false);
                return true;
            },
            Err(e) => {
                tracing::error!(error = %e, "Failed to read current delivery token");
                return false;
            },
        };

        if let Err(e) = self.provider.delete_token(&token).await {
            tracing::error!(token = %token, error = %e, "Provider refused to delete delivery token");
            return false;
        }
        if let Err(e) = self.registry.unsubscribe(&token).await {
            tracing::error!(token = %token, error = %e, "Registry unsubscribe failed");
            return false;
        }

        self.store.set_subscribed(false);
        tracing::info!(token = %token, "Push subscription removed");
        true
    }

    /// Re-derive the token and re-register it whether or not it changed.
    ///
    /// Only a subscribed session refreshes; an unsubscribed one stays
    /// unsubscribed, including when `unsubscribe` was queued behind this call.
    #[tracing::instrument(skip(self))]
    pub async fn refresh_token(&self) -> bool {
        if !self.ready_to_register() {
            return false;
        }
        let _sync = self.sync.lock().await;
        if !self.store.is_subscribed() {
            tracing::debug!("Not subscribed; nothing to refresh");
            return false;
        }

        let outcome = async {
            self.ensure_granted()?;
            let handle = self
                .worker
                .ensure_ready()
                .await
                .ok_or_else(|| PushError::registration("worker", "service worker unavailable"))?;
            let token = self.acquire_token(&handle).await?;
            self.registry.subscribe(&token).await?;
            self.store.mark_synced();
            Ok::<_, PushError>(token)
        }
        .await;

        match outcome {
            Ok(token) => {
                tracing::debug!(token = %token, "Delivery token refreshed");
                true
            },
            Err(e) => {
                tracing::warn!(error = %e, "Token refresh failed; will retry on next trigger");
                false
            },
        }
    }

    /// Register a token the worker reported, without asking the provider again.
    ///
    /// Rotations reported after an unsubscribe are dropped.
    #[tracing::instrument(skip(self, token), fields(token = %token))]
    pub async fn relay_token(&self, token: DeliveryToken) -> bool {
        if !self.ready_to_register() || token.is_empty() {
            return false;
        }
        let _sync = self.sync.lock().await;
        if !self.store.is_subscribed() {
            tracing::debug!("Not subscribed; rotated token dropped");
            return false;
        }

        match self.registry.subscribe(&token).await {
            Ok(()) => {
                self.store.mark_synced();
                tracing::info!("Rotated delivery token registered");
                true
            },
            Err(e) => {
                tracing::warn!(error = %e, "Failed to register rotated delivery token");
                false
            },
        }
    }

    /// Reconcile `subscribed` with the platform's permission and token
    #[tracing::instrument(skip(self))]
    pub async fn check_subscription(&self) {
        if !self.store.is_supported() {
            return;
        }

        if !self.negotiator.refresh_permission().await.is_granted() {
            self.store.set_subscribed(false);
            return;
        }

        let _sync = self.sync.lock().await;
        match self.provider.current_token().await {
            Ok(None) => self.store.set_subscribed(false),
            Ok(Some(token)) => {
                if self.store.is_subscribed() || self.store.is_registering() {
                    return;
                }
                tracing::info!(token = %token, "Provider holds a token the registry may not know; re-registering");
                match self.registry.subscribe(&token).await {
                    Ok(()) => self.store.mark_synced(),
                    Err(e) => tracing::warn!(error = %e, "Re-registration of existing token failed"),
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read current delivery token");
            },
        }
    }
}
