//! Client-side push subscription pipeline
//!
//! Negotiates notification permission, supervises the background worker,
//! keeps the provider's delivery token registered with the backend registry,
//! and routes inbound payloads to either the visible page or the worker.
//!
//! Every browser primitive sits behind a capability trait in
//! [`components::platform`]; [`backends`] provides the HTTP registry client,
//! `web_sys` page bindings on `wasm32`, and (with the `simulated` feature) an
//! in-process browser for tests and demos.

pub mod backends;
pub mod components;
pub mod config;
pub mod telemetry;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;

pub use backends::{HttpRegistry, PlatformBindings, WorkerBindings};
#[cfg(any(test, feature = "simulated"))]
pub use backends::{InMemoryRegistry, SimulatedBrowser};
#[cfg(target_arch = "wasm32")]
pub use backends::WebPlatform;
pub use components::*;
pub use config::{LogConfig, LogFormat, PushConfig};

/// Outcome of delivering one payload on the page side
#[derive(Debug, Clone, PartialEq)]
pub struct ForegroundDelivery {
    pub path: DeliveryPath,
    /// In-page notification, when the foreground path rendered one
    pub shown: Option<ShownNotification>,
}

/// Page-side push agent: one per application session.
///
/// UI code only sees booleans and [`SubscriptionState`] snapshots; errors end
/// at a log entry inside the agent.
pub struct PushAgent {
    config: PushConfig,
    store: SubscriptionStore,
    negotiator: Arc<PermissionNegotiator>,
    worker: Arc<WorkerRegistrationManager>,
    tokens: Arc<TokenLifecycleManager>,
    scheduler: RefreshScheduler,
    router: MessageRouter,
    notifier: Option<ForegroundNotifier>,
    started: AtomicBool,
}

/// Wires capabilities and configuration into a [`PushAgent`]
pub struct PushAgentBuilder {
    config: PushConfig,
    permission: Option<Arc<dyn PermissionBackend>>,
    container: Option<Arc<dyn WorkerContainer>>,
    provider: Option<Arc<dyn PushProvider>>,
    registry: Option<Arc<dyn SubscriptionRegistry>>,
    surface: Option<Arc<dyn NotificationSurface>>,
    window: Option<Arc<dyn PageWindow>>,
}

impl PushAgentBuilder {
    pub fn with_platform(mut self, bindings: PlatformBindings) -> Self {
        self.permission = Some(bindings.permission);
        self.container = Some(bindings.container);
        self.provider = Some(bindings.provider);
        if bindings.registry.is_some() {
            self.registry = bindings.registry;
        }
        self.surface = bindings.surface;
        self.window = bindings.window;
        self
    }

    pub fn with_permission_backend(mut self, backend: Arc<dyn PermissionBackend>) -> Self {
        self.permission = Some(backend);
        self
    }

    pub fn with_worker_container(mut self, container: Arc<dyn WorkerContainer>) -> Self {
        self.container = Some(container);
        self
    }

    pub fn with_push_provider(mut self, provider: Arc<dyn PushProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_registry(mut self, registry: Arc<dyn SubscriptionRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_notification_surface(mut self, surface: Arc<dyn NotificationSurface>) -> Self {
        self.surface = Some(surface);
        self
    }

    pub fn with_page_window(mut self, window: Arc<dyn PageWindow>) -> Self {
        self.window = Some(window);
        self
    }

    /// Validate configuration and assemble the agent.
    ///
    /// Capabilities that report themselves unavailable are not an error: the
    /// agent is built with `supported = false` and every operation degrades
    /// to a no-op. Capabilities never bound at all are.
    pub fn build(self) -> PushResult<PushAgent> {
        self.config.validate()?;

        let (Some(permission), Some(container), Some(provider)) =
            (self.permission, self.container, self.provider)
        else {
            return Err(PushError::config(
                "platform",
                "permission backend, worker container and push provider are required",
            ));
        };

        let registry = match self.registry {
            Some(registry) => registry,
            None => Arc::new(HttpRegistry::new(
                &self.config.api_base()?,
                self.config.http_timeout(),
                self.config.connect_timeout(),
                self.config.registry.legacy_endpoint_field,
            )?) as Arc<dyn SubscriptionRegistry>,
        };

        let supported =
            permission.is_available() && container.is_available() && provider.is_available();
        if !supported {
            tracing::info!("Push notifications are not supported on this platform");
        }

        let store = SubscriptionStore::new(supported, PermissionState::Default);
        let negotiator = Arc::new(PermissionNegotiator::new(Arc::clone(&permission), store.clone()));
        let worker = Arc::new(WorkerRegistrationManager::new(
            container,
            self.config.worker.worker_script.clone(),
            self.config.worker.worker_scope.clone(),
            self.config.ready_timeout(),
        ));
        let tokens = Arc::new(TokenLifecycleManager::new(
            store.clone(),
            Arc::clone(&negotiator),
            Arc::clone(&worker),
            provider,
            registry,
            self.config.vapid_key.clone(),
        ));
        let scheduler = RefreshScheduler::new(
            Arc::clone(&tokens),
            self.config.settle_delay(),
            self.config.initial_refresh_delay(),
            self.config.refresh_interval(),
        )
        .with_jitter(self.config.refresh.refresh_jitter);
        let notifier = match (self.surface, self.window) {
            (Some(surface), Some(window)) => Some(ForegroundNotifier::new(
                permission,
                surface,
                window,
                self.config.worker.default_url.clone(),
            )),
            _ => None,
        };

        Ok(PushAgent {
            config: self.config,
            store,
            negotiator,
            worker,
            tokens,
            scheduler,
            router: MessageRouter::new(),
            notifier,
            started: AtomicBool::new(false),
        })
    }
}

impl PushAgent {
    pub fn builder(config: PushConfig) -> PushAgentBuilder {
        PushAgentBuilder {
            config,
            permission: None,
            container: None,
            provider: None,
            registry: None,
            surface: None,
            window: None,
        }
    }

    pub fn config(&self) -> &PushConfig {
        &self.config
    }

    /// Mount the pipeline: register the worker, reconcile the subscription,
    /// attach the worker relay and either arm the gesture gate or subscribe.
    ///
    /// Never prompts. Returns `false` when push is unsupported.
    pub async fn start(&self) -> bool {
        if !self.store.is_supported() {
            return false;
        }
        if self.started.swap(true, Ordering::AcqRel) {
            return true;
        }

        if self.worker.register_worker().await.is_none() {
            tracing::warn!("Push unavailable for this session: worker registration failed");
        }
        self.tokens.check_subscription().await;
        self.scheduler.attach_worker_channel(self.worker.messages());

        match self.store.permission() {
            PermissionState::Default => {
                self.negotiator.arm_gesture_gate();
            },
            PermissionState::Granted => {
                if !self.store.is_subscribed() && !self.store.is_registering() {
                    self.tokens.subscribe().await;
                }
                self.ensure_periodic_refresh();
            },
            PermissionState::Denied => {
                tracing::debug!("Notification permission denied; push stays inactive");
            },
        }

        tracing::info!(
            permission = %self.store.permission(),
            subscribed = self.store.is_subscribed(),
            "Push agent started"
        );
        true
    }

    /// Feed a page interaction. The first qualifying gesture prompts once;
    /// a grant subscribes and starts periodic refresh.
    ///
    /// Returns the prompt outcome when this interaction triggered the prompt.
    pub async fn handle_interaction(&self, kind: InteractionKind) -> Option<bool> {
        let granted = self.negotiator.on_interaction(kind).await?;
        if granted {
            self.tokens.subscribe().await;
            self.ensure_periodic_refresh();
        }
        Some(granted)
    }

    /// Ask for permission directly. Prefer [`PushAgent::handle_interaction`],
    /// which only prompts from a genuine user gesture.
    pub async fn request_permission(&self) -> bool {
        self.negotiator.request_permission().await
    }

    pub async fn subscribe(&self) -> bool {
        let subscribed = self.tokens.subscribe().await;
        if subscribed {
            self.ensure_periodic_refresh();
        }
        subscribed
    }

    pub async fn unsubscribe(&self) -> bool {
        let unsubscribed = self.tokens.unsubscribe().await;
        if unsubscribed {
            self.scheduler.stop_periodic();
        }
        unsubscribed
    }

    pub async fn refresh_token(&self) -> bool {
        self.tokens.refresh_token().await
    }

    pub async fn check_subscription(&self) {
        self.tokens.check_subscription().await;
    }

    /// Page visibility changed; becoming visible schedules a settled refresh
    pub fn set_visibility(&self, visibility: Visibility) {
        self.router.set_visibility(visibility);
        self.scheduler.on_visibility_change(visibility);
    }

    pub fn window_focused(&self) {
        self.scheduler.on_window_focus();
    }

    /// Register a foreground handler; drop the guard to unsubscribe
    pub fn on_foreground_message<F>(&self, handler: F) -> ForegroundSubscription
    where
        F: Fn(&PushPayload) + Send + Sync + 'static,
    {
        self.router.on_foreground_message(handler)
    }

    /// Deliver a payload received while the page is alive.
    ///
    /// On the foreground path the payload also renders as an in-page
    /// notification, permission permitting.
    pub async fn deliver_foreground(&self, payload: &PushPayload) -> ForegroundDelivery {
        let path = self.router.route(payload);
        let shown = match (&path, &self.notifier) {
            (DeliveryPath::Foreground { .. }, Some(notifier)) => notifier.render(payload).await,
            _ => None,
        };
        ForegroundDelivery { path, shown }
    }

    /// Click on an in-page notification; returns the navigation target
    pub fn handle_foreground_click(&self, notification: &ShownNotification) -> Option<String> {
        self.notifier
            .as_ref()
            .map(|notifier| notifier.handle_click(notification))
    }

    /// Ask a waiting worker to take over immediately
    pub fn request_worker_activation(&self) -> bool {
        self.worker.request_skip_waiting()
    }

    pub fn state(&self) -> SubscriptionState {
        self.store.snapshot()
    }

    pub fn watch_state(&self) -> watch::Receiver<SubscriptionState> {
        self.store.watch()
    }

    pub fn is_periodic_refresh_active(&self) -> bool {
        self.scheduler.is_periodic_active()
    }

    /// Release every timer and listener
    pub fn shutdown(&self) {
        self.negotiator.gesture_gate().disarm();
        self.scheduler.shutdown();
        tracing::debug!("Push agent shut down");
    }

    fn ensure_periodic_refresh(&self) {
        if !self.scheduler.is_periodic_active() {
            self.scheduler.start_periodic();
        }
    }
}

/// Build the worker-side runtime from configuration
pub fn worker_runtime(config: &PushConfig, bindings: WorkerBindings) -> ServiceWorkerRuntime {
    ServiceWorkerRuntime::new(
        config.worker.cache_version.clone(),
        config.worker.default_url.clone(),
        bindings.scope,
        bindings.caches,
        bindings.clients,
        bindings.notifications,
    )
}
