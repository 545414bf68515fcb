// Capability backends for the push pipeline
// HTTP registry client, browser bindings on wasm32, and the simulated browser

#[cfg(any(test, feature = "simulated"))]
pub mod memory;
pub mod registry;
#[cfg(target_arch = "wasm32")]
pub mod web;

use std::sync::Arc;

use crate::components::{
    CacheStorage, NotificationSurface, PageWindow, PermissionBackend, PushProvider,
    SubscriptionRegistry, WindowClients, WorkerContainer, WorkerScope,
};

#[cfg(any(test, feature = "simulated"))]
pub use memory::{InMemoryRegistry, SimulatedBrowser};
pub use registry::HttpRegistry;
#[cfg(target_arch = "wasm32")]
pub use web::WebPlatform;

/// Page-context capabilities handed to the agent builder
#[derive(Clone)]
pub struct PlatformBindings {
    pub permission: Arc<dyn PermissionBackend>,
    pub container: Arc<dyn WorkerContainer>,
    pub provider: Arc<dyn PushProvider>,
    /// `None` builds an [`HttpRegistry`] from configuration
    pub registry: Option<Arc<dyn SubscriptionRegistry>>,
    /// Foreground rendering is disabled without both surface and window
    pub surface: Option<Arc<dyn NotificationSurface>>,
    pub window: Option<Arc<dyn PageWindow>>,
}

impl PlatformBindings {
    /// Bind the browser's page capabilities; the push provider client is supplied by the host
    #[cfg(target_arch = "wasm32")]
    pub fn web(platform: &WebPlatform, provider: Arc<dyn PushProvider>) -> Self {
        Self {
            permission: Arc::new(platform.clone()),
            container: Arc::new(platform.clone()),
            provider,
            registry: None,
            surface: Some(Arc::new(platform.clone())),
            window: Some(Arc::new(platform.clone())),
        }
    }

    /// Bind every page capability to one simulated browser
    #[cfg(any(test, feature = "simulated"))]
    pub fn simulated(browser: &SimulatedBrowser, registry: Option<InMemoryRegistry>) -> Self {
        Self {
            permission: Arc::new(browser.clone()),
            container: Arc::new(browser.clone()),
            provider: Arc::new(browser.clone()),
            registry: registry.map(|registry| Arc::new(registry) as Arc<dyn SubscriptionRegistry>),
            surface: Some(Arc::new(browser.clone())),
            window: Some(Arc::new(browser.clone())),
        }
    }

    /// Whether every capability the pipeline needs is present
    pub fn is_supported(&self) -> bool {
        self.permission.is_available() && self.container.is_available() && self.provider.is_available()
    }
}

/// Worker-context capabilities for [`ServiceWorkerRuntime`](crate::components::ServiceWorkerRuntime)
#[derive(Clone)]
pub struct WorkerBindings {
    pub scope: Arc<dyn WorkerScope>,
    pub caches: Arc<dyn CacheStorage>,
    pub clients: Arc<dyn WindowClients>,
    pub notifications: Arc<dyn NotificationSurface>,
}

impl WorkerBindings {
    #[cfg(any(test, feature = "simulated"))]
    pub fn simulated(browser: &SimulatedBrowser) -> Self {
        Self {
            scope: Arc::new(browser.clone()),
            caches: Arc::new(browser.clone()),
            clients: Arc::new(browser.clone()),
            notifications: Arc::new(browser.clone()),
        }
    }
}
