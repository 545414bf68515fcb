// Foreground/background message routing and in-page notification rendering
// A payload takes exactly one path: page handlers while visible, the worker otherwise

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;

use super::payload::{NotificationSpec, PushPayload, ShownNotification};
use super::permission::PermissionState;
use super::platform::{NotificationSurface, PageWindow, PermissionBackend};

/// Page visibility as reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Visibility {
    #[default]
    Visible,
    Hidden,
}

/// Which context handles an inbound payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryPath {
    /// Delivered to this many page handlers
    Foreground { handlers: usize },
    /// Left to the worker's push handler
    Background,
}

type ForegroundHandler = Arc<dyn Fn(&PushPayload) + Send + Sync>;
type HandlerMap = DashMap<u64, ForegroundHandler>;

/// Routes inbound payloads between page handlers and the worker
pub struct MessageRouter {
    handlers: Arc<HandlerMap>,
    next_id: AtomicU64,
    visible: AtomicBool,
}

impl Default for MessageRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageRouter {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(1),
            visible: AtomicBool::new(true),
        }
    }

    /// Register a foreground handler; dropping the returned guard removes it
    pub fn on_foreground_message<F>(&self, handler: F) -> ForegroundSubscription
    where
        F: Fn(&PushPayload) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers.insert(id, Arc::new(handler));
        tracing::debug!(handler_id = id, "Foreground message handler registered");
        ForegroundSubscription {
            id,
            handlers: Arc::downgrade(&self.handlers),
        }
    }

    pub fn set_visibility(&self, visibility: Visibility) {
        self.visible
            .store(visibility == Visibility::Visible, Ordering::Release);
    }

    pub fn is_visible(&self) -> bool {
        self.visible.load(Ordering::Acquire)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Deliver `payload` to every page handler when the page is visible
    pub fn route(&self, payload: &PushPayload) -> DeliveryPath {
        if !self.is_visible() {
            return DeliveryPath::Background;
        }

        // Snapshot first so handlers may (un)subscribe without holding shard locks
        let handlers: Vec<ForegroundHandler> = self
            .handlers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        if handlers.is_empty() {
            return DeliveryPath::Background;
        }

        for handler in &handlers {
            handler(payload);
        }
        DeliveryPath::Foreground {
            handlers: handlers.len(),
        }
    }
}

/// Guard for a registered foreground handler
#[derive(Debug)]
pub struct ForegroundSubscription {
    id: u64,
    handlers: Weak<HandlerMap>,
}

impl ForegroundSubscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for ForegroundSubscription {
    fn drop(&mut self) {
        if let Some(handlers) = self.handlers.upgrade()
            && handlers.remove(&self.id).is_some()
        {
            tracing::debug!(handler_id = self.id, "Foreground message handler removed");
        }
    }
}

/// Renders foreground payloads as in-page notifications
pub struct ForegroundNotifier {
    permission: Arc<dyn PermissionBackend>,
    surface: Arc<dyn NotificationSurface>,
    window: Arc<dyn PageWindow>,
    default_url: String,
}

impl ForegroundNotifier {
    pub fn new(
        permission: Arc<dyn PermissionBackend>,
        surface: Arc<dyn NotificationSurface>,
        window: Arc<dyn PageWindow>,
        default_url: impl Into<String>,
    ) -> Self {
        Self {
            permission,
            surface,
            window,
            default_url: default_url.into(),
        }
    }

    /// Show `payload`, re-checking permission right before rendering
    pub async fn render(&self, payload: &PushPayload) -> Option<ShownNotification> {
        let permission = match self.permission.query().await {
            Ok(permission) => permission,
            Err(e) => {
                tracing::warn!(error = %e, "Permission query failed before rendering");
                PermissionState::Denied
            },
        };
        if !permission.is_granted() {
            tracing::info!(permission = %permission, "Foreground message received without permission; not rendered");
            return None;
        }

        let spec = NotificationSpec::from_payload(payload);
        match self.surface.show(&spec).await {
            Ok(id) => {
                tracing::debug!(notification_id = %id, tag = %spec.tag, "Foreground notification shown");
                Some(ShownNotification { id, spec })
            },
            Err(e) => {
                tracing::warn!(error = %e, "Failed to show foreground notification");
                None
            },
        }
    }

    /// Focus this window, navigate to the notification's target and close it.
    /// Returns the target navigated to.
    pub fn handle_click(&self, notification: &ShownNotification) -> String {
        let target = notification.spec.target_url(&self.default_url);
        if let Err(e) = self.window.focus() {
            tracing::warn!(error = %e, "Failed to focus window");
        }
        if let Err(e) = self.window.navigate(&target) {
            tracing::warn!(url = %target, error = %e, "Failed to navigate window");
        }
        if let Err(e) = self.surface.close(notification.id) {
            tracing::warn!(notification_id = %notification.id, error = %e, "Failed to close notification");
        }
        target
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[test]
    fn hidden_page_routes_to_background() {
        let router = MessageRouter::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let _sub = router.on_foreground_message(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        router.set_visibility(Visibility::Hidden);
        assert_eq!(router.route(&PushPayload::default()), DeliveryPath::Background);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        router.set_visibility(Visibility::Visible);
        assert_eq!(
            router.route(&PushPayload::default()),
            DeliveryPath::Foreground { handlers: 1 }
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn no_handlers_routes_to_background() {
        let router = MessageRouter::new();
        assert_eq!(router.route(&PushPayload::default()), DeliveryPath::Background);
    }

    #[test]
    fn dropping_subscription_removes_handler() {
        let router = MessageRouter::new();
        let first = router.on_foreground_message(|_| {});
        let second = router.on_foreground_message(|_| {});
        assert_ne!(first.id(), second.id());
        assert_eq!(router.handler_count(), 2);

        first.unsubscribe();
        assert_eq!(router.handler_count(), 1);
        drop(second);
        assert_eq!(router.handler_count(), 0);
    }

    #[test]
    fn subscription_outliving_router_is_harmless() {
        let router = MessageRouter::new();
        let sub = router.on_foreground_message(|_| {});
        drop(router);
        drop(sub);
    }
}
