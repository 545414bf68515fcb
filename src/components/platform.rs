// Platform capability traits for the push pipeline
// Every browser primitive the pipeline touches sits behind one of these seams

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use url::Url;
use uuid::Uuid;

use super::payload::NotificationSpec;
use super::permission::PermissionState;
use super::worker::WorkerHandle;
use super::{DeliveryToken, NotificationId, PlatformFuture, PushResult};

/// Identifier of an open application window as seen from the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId(Uuid);

impl ClientId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Window client snapshot returned by [`WindowClients::match_all`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowClient {
    pub id: ClientId,
    pub url: String,
    /// Whether the current worker controls this window
    pub controlled: bool,
    pub focused: bool,
}

impl WindowClient {
    /// Whether this window already shows `target`.
    ///
    /// `target` resolves against the window's own url; origins must agree and
    /// paths must be equal ignoring a trailing slash. Query and fragment are
    /// not compared, so `/todays-leads` matches `/todays-leads?page=2` but not
    /// `/todays-leads-archive`.
    pub fn shows(&self, target: &str) -> bool {
        match Url::parse(&self.url) {
            Ok(current) => current.join(target).is_ok_and(|wanted| {
                current.origin() == wanted.origin() && same_path(current.path(), wanted.path())
            }),
            Err(_) => same_path(path_only(&self.url), path_only(target)),
        }
    }
}

fn path_only(url: &str) -> &str {
    url.split(['?', '#']).next().unwrap_or(url)
}

fn same_path(a: &str, b: &str) -> bool {
    a.trim_end_matches('/') == b.trim_end_matches('/')
}

/// Notification permission primitive (page context)
pub trait PermissionBackend: Send + Sync {
    /// Whether the platform exposes notification permission at all
    fn is_available(&self) -> bool;

    /// Read the current permission without prompting
    fn query(&self) -> PlatformFuture<'_, PushResult<PermissionState>>;

    /// Show the platform prompt and return the user's answer
    fn request(&self) -> PlatformFuture<'_, PushResult<PermissionState>>;
}

/// Worker container (page context): registers and observes the background worker
pub trait WorkerContainer: Send + Sync {
    fn is_available(&self) -> bool;

    /// Register `script_url` at `scope`; an identical registration resolves to the existing one
    fn register<'a>(
        &'a self,
        script_url: &'a str,
        scope: &'a str,
    ) -> PlatformFuture<'a, PushResult<WorkerHandle>>;

    /// Resolve once the registration has an active worker
    fn ready<'a>(&'a self, handle: &'a WorkerHandle) -> PlatformFuture<'a, PushResult<()>>;

    /// Messages the worker posts to this page, as raw structured values
    fn subscribe_messages(&self) -> broadcast::Receiver<Value>;

    /// Post a structured message to the active worker
    fn post_to_worker(&self, message: Value) -> PushResult<()>;
}

/// Push provider client (page context)
pub trait PushProvider: Send + Sync {
    fn is_available(&self) -> bool;

    /// Legacy provider mode: subscription needs an application server key
    fn requires_server_key(&self) -> bool {
        false
    }

    /// Obtain (or re-derive) the delivery token bound to `registration`
    fn get_token<'a>(
        &'a self,
        registration: &'a WorkerHandle,
        server_key: Option<&'a str>,
    ) -> PlatformFuture<'a, PushResult<Option<DeliveryToken>>>;

    /// Token currently held by the provider, without creating one
    fn current_token(&self) -> PlatformFuture<'_, PushResult<Option<DeliveryToken>>>;

    /// Invalidate `token` at the provider
    fn delete_token<'a>(&'a self, token: &'a DeliveryToken) -> PlatformFuture<'a, PushResult<()>>;
}

/// Backend registry of device → token associations
pub trait SubscriptionRegistry: Send + Sync {
    /// Idempotent upsert keyed by token value
    fn subscribe<'a>(&'a self, token: &'a DeliveryToken) -> PlatformFuture<'a, PushResult<()>>;

    /// Remove the record for `token`; an absent record is success
    fn unsubscribe<'a>(&'a self, token: &'a DeliveryToken) -> PlatformFuture<'a, PushResult<()>>;

    /// Application server key for legacy provider mode
    fn vapid_public_key(&self) -> PlatformFuture<'_, PushResult<Option<String>>>;
}

/// Worker global scope (worker context)
pub trait WorkerScope: Send + Sync {
    /// Activate immediately instead of waiting for old clients to close
    fn skip_waiting(&self) -> PlatformFuture<'_, PushResult<()>>;

    /// Take control of every open client page
    fn claim_clients(&self) -> PlatformFuture<'_, PushResult<()>>;
}

/// Named cache storage owned by the worker
pub trait CacheStorage: Send + Sync {
    fn keys(&self) -> PlatformFuture<'_, PushResult<Vec<String>>>;

    fn delete<'a>(&'a self, name: &'a str) -> PlatformFuture<'a, PushResult<bool>>;
}

/// Window clients reachable from the worker
pub trait WindowClients: Send + Sync {
    fn match_all(
        &self,
        include_uncontrolled: bool,
    ) -> PlatformFuture<'_, PushResult<Vec<WindowClient>>>;

    fn focus(&self, id: ClientId) -> PlatformFuture<'_, PushResult<()>>;

    fn open_window<'a>(
        &'a self,
        url: &'a str,
    ) -> PlatformFuture<'a, PushResult<Option<WindowClient>>>;

    /// Post a structured message to one client page
    fn post_message(&self, id: ClientId, message: Value) -> PushResult<()>;
}

/// System notification surface (shared by worker and page rendering)
pub trait NotificationSurface: Send + Sync {
    fn show<'a>(
        &'a self,
        spec: &'a NotificationSpec,
    ) -> PlatformFuture<'a, PushResult<NotificationId>>;

    fn close(&self, id: NotificationId) -> PushResult<()>;
}

/// The current page's window (page context)
pub trait PageWindow: Send + Sync {
    fn focus(&self) -> PushResult<()>;

    fn navigate(&self, url: &str) -> PushResult<()>;
}
