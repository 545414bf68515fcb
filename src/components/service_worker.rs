// Background worker runtime: lifecycle, push display and click routing
// Runs inside the worker context; every async step is extended until it settles

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tokio::task::JoinSet;

use super::messages::WorkerMessage;
use super::payload::{ACTION_CLOSE, NotificationSpec, PushPayload, ShownNotification};
use super::platform::{CacheStorage, NotificationSurface, WindowClients, WorkerScope};
use super::{DeliveryToken, PushError, PushResult};

/// Events delivered to the worker by the platform
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    Install,
    Activate,
    /// Raw push data; `None` when the push carried no body
    Push { data: Option<Vec<u8>> },
    NotificationClick {
        notification: ShownNotification,
        action: Option<String>,
    },
    /// Structured message posted by a page
    Message(Value),
    /// The provider rotated the delivery token out of band
    TokenRotated(DeliveryToken),
}

impl WorkerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            WorkerEvent::Install => "install",
            WorkerEvent::Activate => "activate",
            WorkerEvent::Push { .. } => "push",
            WorkerEvent::NotificationClick { .. } => "notificationclick",
            WorkerEvent::Message(_) => "message",
            WorkerEvent::TokenRotated(_) => "tokenrotated",
        }
    }
}

/// Lifetime extension for one dispatched event.
///
/// The worker context stays alive until every future passed to
/// [`ExtendableEvent::wait_until`] has finished.
pub struct ExtendableEvent {
    name: &'static str,
    tasks: JoinSet<PushResult<()>>,
}

impl ExtendableEvent {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            tasks: JoinSet::new(),
        }
    }

    pub fn wait_until<F>(&mut self, work: F)
    where
        F: Future<Output = PushResult<()>> + Send + 'static,
    {
        self.tasks.spawn(work);
    }

    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    /// Drain all extended work. Returns the first failure after everything has finished.
    pub async fn settle(mut self) -> PushResult<()> {
        let mut first_error = None;
        while let Some(joined) = self.tasks.join_next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) => Err(PushError::Registration {
                    stage: self.name.to_string(),
                    message: format!("extended task aborted: {e}"),
                }),
            };
            if let Err(e) = outcome {
                tracing::warn!(event = self.name, error = %e, "Worker event task failed");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Event handlers of the background worker
pub struct ServiceWorkerRuntime {
    cache_version: String,
    default_url: String,
    scope: Arc<dyn WorkerScope>,
    caches: Arc<dyn CacheStorage>,
    clients: Arc<dyn WindowClients>,
    notifications: Arc<dyn NotificationSurface>,
}

impl ServiceWorkerRuntime {
    pub fn new(
        cache_version: impl Into<String>,
        default_url: impl Into<String>,
        scope: Arc<dyn WorkerScope>,
        caches: Arc<dyn CacheStorage>,
        clients: Arc<dyn WindowClients>,
        notifications: Arc<dyn NotificationSurface>,
    ) -> Self {
        Self {
            cache_version: cache_version.into(),
            default_url: default_url.into(),
            scope,
            caches,
            clients,
            notifications,
        }
    }

    pub fn cache_version(&self) -> &str {
        &self.cache_version
    }

    pub fn default_url(&self) -> &str {
        &self.default_url
    }

    /// Dispatch one event and wait for all of its extended work
    pub async fn dispatch(&self, event: WorkerEvent) -> PushResult<()> {
        let mut extendable = ExtendableEvent::new(event.name());
        tracing::debug!(event = event.name(), "Worker event received");

        match event {
            WorkerEvent::Install => self.on_install(&mut extendable),
            WorkerEvent::Activate => self.on_activate(&mut extendable),
            WorkerEvent::Push { data } => self.on_push(&mut extendable, data),
            WorkerEvent::NotificationClick {
                notification,
                action,
            } => self.on_notification_click(&mut extendable, notification, action),
            WorkerEvent::Message(message) => self.on_message(&mut extendable, &message),
            WorkerEvent::TokenRotated(token) => self.on_token_rotated(&mut extendable, token),
        }

        extendable.settle().await
    }

    fn on_install(&self, event: &mut ExtendableEvent) {
        let scope = Arc::clone(&self.scope);
        event.wait_until(async move {
            scope.skip_waiting().await?;
            tracing::info!("Worker installed; activating without waiting");
            Ok(())
        });
    }

    fn on_activate(&self, event: &mut ExtendableEvent) {
        let scope = Arc::clone(&self.scope);
        let caches = Arc::clone(&self.caches);
        let current = self.cache_version.clone();
        event.wait_until(async move {
            for name in caches.keys().await? {
                if name != current {
                    tracing::info!(cache = %name, "Deleting stale cache");
                    caches.delete(&name).await?;
                }
            }
            scope.claim_clients().await?;
            tracing::info!(cache = %current, "Worker activated and controlling clients");
            Ok(())
        });
    }

    fn on_push(&self, event: &mut ExtendableEvent, data: Option<Vec<u8>>) {
        let spec = match data.as_deref().map(PushPayload::from_slice) {
            Some(Ok(payload)) => NotificationSpec::from_payload(&payload),
            Some(Err(e)) => {
                tracing::warn!(error = %e, "Unreadable push payload; showing default notification");
                NotificationSpec::fallback()
            },
            None => NotificationSpec::fallback(),
        };

        let notifications = Arc::clone(&self.notifications);
        event.wait_until(async move {
            let id = notifications.show(&spec).await?;
            tracing::info!(notification_id = %id, tag = %spec.tag, "Push notification displayed");
            Ok(())
        });
    }

    fn on_notification_click(
        &self,
        event: &mut ExtendableEvent,
        notification: ShownNotification,
        action: Option<String>,
    ) {
        if let Err(e) = self.notifications.close(notification.id) {
            tracing::warn!(notification_id = %notification.id, error = %e, "Failed to close notification");
        }

        if action.as_deref() == Some(ACTION_CLOSE) {
            tracing::debug!(notification_id = %notification.id, "Notification dismissed");
            return;
        }

        let target = notification.spec.target_url(&self.default_url);
        let clients = Arc::clone(&self.clients);
        event.wait_until(async move {
            let windows = clients.match_all(true).await?;
            if let Some(window) = windows.iter().find(|window| window.shows(&target)) {
                clients.focus(window.id).await?;
                tracing::info!(url = %target, client = %window.id, "Focused existing window");
                return Ok(());
            }

            match clients.open_window(&target).await? {
                Some(window) => {
                    tracing::info!(url = %target, client = %window.id, "Opened new window");
                },
                None => tracing::warn!(url = %target, "Platform refused to open a window"),
            }
            Ok(())
        });
    }

    fn on_message(&self, event: &mut ExtendableEvent, message: &Value) {
        match WorkerMessage::from_value(message) {
            Ok(WorkerMessage::SkipWaiting) => {
                let scope = Arc::clone(&self.scope);
                event.wait_until(async move { scope.skip_waiting().await });
            },
            Ok(other) => {
                tracing::debug!(kind = other.kind(), "Ignoring page message not addressed to the worker");
            },
            Err(e) => tracing::debug!(error = %e, "Ignoring malformed page message"),
        }
    }

    fn on_token_rotated(&self, event: &mut ExtendableEvent, token: DeliveryToken) {
        let clients = Arc::clone(&self.clients);
        event.wait_until(async move {
            let message = WorkerMessage::TokenRefresh {
                token: token.clone(),
            }
            .to_value();
            let controlled = clients.match_all(false).await?;
            for client in &controlled {
                if let Err(e) = clients.post_message(client.id, message.clone()) {
                    tracing::warn!(client = %client.id, error = %e, "Failed to relay rotated token");
                }
            }
            tracing::info!(token = %token, clients = controlled.len(), "Rotated token posted to pages");
            Ok(())
        });
    }
}
