// In-process simulation of the browser primitives and the backend registry
// Drives the pipeline in tests and demos; every call is recorded for inspection

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{broadcast, watch};

use crate::components::{
    CacheStorage, ClientId, DeliveryToken, NotificationId, NotificationSpec, NotificationSurface,
    PageWindow, PermissionBackend, PermissionState, PlatformFuture, PushError, PushProvider,
    PushResult, SubscriptionRegistry, WindowClient, WindowClients, WorkerContainer, WorkerHandle,
    WorkerScope,
};

const PAGE_CHANNEL_CAPACITY: usize = 64;

struct BrowserInner {
    permission_available: AtomicBool,
    worker_available: AtomicBool,
    provider_available: AtomicBool,
    requires_server_key: AtomicBool,

    permission: Mutex<PermissionState>,
    prompt_response: Mutex<PermissionState>,
    prompt_count: AtomicUsize,
    fail_permission_query: AtomicBool,

    registrations: Mutex<HashMap<String, WorkerHandle>>,
    register_calls: AtomicUsize,
    fail_registration: AtomicBool,
    worker_ready: watch::Sender<bool>,
    page_channel: broadcast::Sender<Value>,
    worker_inbox: Mutex<Vec<Value>>,

    token: Mutex<Option<DeliveryToken>>,
    token_counter: AtomicU64,
    get_token_calls: AtomicUsize,
    server_keys_seen: Mutex<Vec<Option<String>>>,
    fail_token: AtomicBool,
    fail_delete_token: AtomicBool,

    caches: Mutex<BTreeSet<String>>,
    clients: Mutex<Vec<WindowClient>>,
    focused_clients: Mutex<Vec<ClientId>>,
    opened_windows: Mutex<Vec<String>>,
    skip_waiting_count: AtomicUsize,
    claim_count: AtomicUsize,

    shown: Mutex<Vec<(NotificationId, NotificationSpec)>>,
    closed: Mutex<Vec<NotificationId>>,
    page_focus_count: AtomicUsize,
    navigations: Mutex<Vec<String>>,
}

/// Simulated browser implementing every page and worker capability.
///
/// Clones share state, so one instance can be handed to the agent, the
/// worker runtime and the test asserting on them.
#[derive(Clone)]
pub struct SimulatedBrowser {
    inner: Arc<BrowserInner>,
}

impl Default for SimulatedBrowser {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedBrowser {
    /// Fully capable browser with undecided permission; the prompt grants
    pub fn new() -> Self {
        let (worker_ready, _) = watch::channel(true);
        let (page_channel, _) = broadcast::channel(PAGE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(BrowserInner {
                permission_available: AtomicBool::new(true),
                worker_available: AtomicBool::new(true),
                provider_available: AtomicBool::new(true),
                requires_server_key: AtomicBool::new(false),
                permission: Mutex::new(PermissionState::Default),
                prompt_response: Mutex::new(PermissionState::Granted),
                prompt_count: AtomicUsize::new(0),
                fail_permission_query: AtomicBool::new(false),
                registrations: Mutex::new(HashMap::new()),
                register_calls: AtomicUsize::new(0),
                fail_registration: AtomicBool::new(false),
                worker_ready,
                page_channel,
                worker_inbox: Mutex::new(Vec::new()),
                token: Mutex::new(None),
                token_counter: AtomicU64::new(0),
                get_token_calls: AtomicUsize::new(0),
                server_keys_seen: Mutex::new(Vec::new()),
                fail_token: AtomicBool::new(false),
                fail_delete_token: AtomicBool::new(false),
                caches: Mutex::new(BTreeSet::new()),
                clients: Mutex::new(Vec::new()),
                focused_clients: Mutex::new(Vec::new()),
                opened_windows: Mutex::new(Vec::new()),
                skip_waiting_count: AtomicUsize::new(0),
                claim_count: AtomicUsize::new(0),
                shown: Mutex::new(Vec::new()),
                closed: Mutex::new(Vec::new()),
                page_focus_count: AtomicUsize::new(0),
                navigations: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Browser with the given permission already decided
    pub fn with_permission(permission: PermissionState) -> Self {
        let browser = Self::new();
        browser.set_permission(permission);
        browser
    }

    // Capability switches

    pub fn set_worker_available(&self, available: bool) {
        self.inner.worker_available.store(available, Ordering::SeqCst);
    }

    pub fn set_provider_available(&self, available: bool) {
        self.inner.provider_available.store(available, Ordering::SeqCst);
    }

    pub fn set_permission_available(&self, available: bool) {
        self.inner
            .permission_available
            .store(available, Ordering::SeqCst);
    }

    pub fn set_requires_server_key(&self, required: bool) {
        self.inner
            .requires_server_key
            .store(required, Ordering::SeqCst);
    }

    // Permission

    /// Change the permission out of band, like a platform settings change
    pub fn set_permission(&self, permission: PermissionState) {
        *self.inner.permission.lock() = permission;
    }

    /// Answer the next prompts with `response`
    pub fn set_prompt_response(&self, response: PermissionState) {
        *self.inner.prompt_response.lock() = response;
    }

    pub fn set_fail_permission_query(&self, fail: bool) {
        self.inner
            .fail_permission_query
            .store(fail, Ordering::SeqCst);
    }

    pub fn prompt_count(&self) -> usize {
        self.inner.prompt_count.load(Ordering::SeqCst)
    }

    // Worker registration

    pub fn set_fail_registration(&self, fail: bool) {
        self.inner.fail_registration.store(fail, Ordering::SeqCst);
    }

    /// While `false`, readiness waits never resolve
    pub fn set_worker_ready(&self, ready: bool) {
        self.inner.worker_ready.send_replace(ready);
    }

    pub fn register_calls(&self) -> usize {
        self.inner.register_calls.load(Ordering::SeqCst)
    }

    pub fn registration_count(&self) -> usize {
        self.inner.registrations.lock().len()
    }

    /// Messages pages posted to the worker
    pub fn worker_inbox(&self) -> Vec<Value> {
        self.inner.worker_inbox.lock().clone()
    }

    // Provider tokens

    pub fn set_fail_token(&self, fail: bool) {
        self.inner.fail_token.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_delete_token(&self, fail: bool) {
        self.inner.fail_delete_token.store(fail, Ordering::SeqCst);
    }

    pub fn current_token_value(&self) -> Option<DeliveryToken> {
        self.inner.token.lock().clone()
    }

    /// Install a token as if it survived from an earlier session
    pub fn set_token(&self, token: Option<DeliveryToken>) {
        *self.inner.token.lock() = token;
    }

    /// Issue a fresh token out of band and return it
    pub fn rotate_token(&self) -> DeliveryToken {
        let token = self.mint_token();
        *self.inner.token.lock() = Some(token.clone());
        token
    }

    pub fn get_token_calls(&self) -> usize {
        self.inner.get_token_calls.load(Ordering::SeqCst)
    }

    /// Server keys passed to each token request, in order
    pub fn server_keys_seen(&self) -> Vec<Option<String>> {
        self.inner.server_keys_seen.lock().clone()
    }

    fn mint_token(&self) -> DeliveryToken {
        let n = self.inner.token_counter.fetch_add(1, Ordering::SeqCst) + 1;
        DeliveryToken::new(format!("sim-token-{n}"))
    }

    // Worker scope, caches, clients

    pub fn add_cache(&self, name: impl Into<String>) {
        self.inner.caches.lock().insert(name.into());
    }

    pub fn cache_names(&self) -> Vec<String> {
        self.inner.caches.lock().iter().cloned().collect()
    }

    /// Open a window client at `url`
    pub fn open_client(&self, url: impl Into<String>, controlled: bool) -> ClientId {
        let client = WindowClient {
            id: ClientId::generate(),
            url: url.into(),
            controlled,
            focused: false,
        };
        let id = client.id;
        self.inner.clients.lock().push(client);
        id
    }

    pub fn clients(&self) -> Vec<WindowClient> {
        self.inner.clients.lock().clone()
    }

    pub fn focused_clients(&self) -> Vec<ClientId> {
        self.inner.focused_clients.lock().clone()
    }

    pub fn opened_windows(&self) -> Vec<String> {
        self.inner.opened_windows.lock().clone()
    }

    pub fn skip_waiting_count(&self) -> usize {
        self.inner.skip_waiting_count.load(Ordering::SeqCst)
    }

    pub fn claim_count(&self) -> usize {
        self.inner.claim_count.load(Ordering::SeqCst)
    }

    // Notifications and page window

    pub fn shown_notifications(&self) -> Vec<(NotificationId, NotificationSpec)> {
        self.inner.shown.lock().clone()
    }

    pub fn closed_notifications(&self) -> Vec<NotificationId> {
        self.inner.closed.lock().clone()
    }

    pub fn page_focus_count(&self) -> usize {
        self.inner.page_focus_count.load(Ordering::SeqCst)
    }

    pub fn navigations(&self) -> Vec<String> {
        self.inner.navigations.lock().clone()
    }
}

impl PermissionBackend for SimulatedBrowser {
    fn is_available(&self) -> bool {
        self.inner.permission_available.load(Ordering::SeqCst)
    }

    fn query(&self) -> PlatformFuture<'_, PushResult<PermissionState>> {
        Box::pin(async move {
            if self.inner.fail_permission_query.load(Ordering::SeqCst) {
                return Err(PushError::unsupported("permission query"));
            }
            Ok(*self.inner.permission.lock())
        })
    }

    fn request(&self) -> PlatformFuture<'_, PushResult<PermissionState>> {
        Box::pin(async move {
            let current = *self.inner.permission.lock();
            // Browsers answer a re-request on a decided permission without prompting
            if !current.can_prompt() {
                return Ok(current);
            }
            self.inner.prompt_count.fetch_add(1, Ordering::SeqCst);
            let response = *self.inner.prompt_response.lock();
            *self.inner.permission.lock() = response;
            Ok(response)
        })
    }
}

impl WorkerContainer for SimulatedBrowser {
    fn is_available(&self) -> bool {
        self.inner.worker_available.load(Ordering::SeqCst)
    }

    fn register<'a>(
        &'a self,
        script_url: &'a str,
        scope: &'a str,
    ) -> PlatformFuture<'a, PushResult<WorkerHandle>> {
        Box::pin(async move {
            self.inner.register_calls.fetch_add(1, Ordering::SeqCst);
            if self.inner.fail_registration.load(Ordering::SeqCst) {
                return Err(PushError::registration(
                    "worker",
                    format!("failed to fetch script {script_url}"),
                ));
            }
            let mut registrations = self.inner.registrations.lock();
            let handle = registrations
                .entry(scope.to_string())
                .or_insert_with(|| WorkerHandle::new(script_url, scope));
            Ok(handle.clone())
        })
    }

    fn ready<'a>(&'a self, _handle: &'a WorkerHandle) -> PlatformFuture<'a, PushResult<()>> {
        Box::pin(async move {
            let mut ready = self.inner.worker_ready.subscribe();
            ready
                .wait_for(|ready| *ready)
                .await
                .map(|_| ())
                .map_err(|e| PushError::registration("ready", e.to_string()))
        })
    }

    fn subscribe_messages(&self) -> broadcast::Receiver<Value> {
        self.inner.page_channel.subscribe()
    }

    fn post_to_worker(&self, message: Value) -> PushResult<()> {
        if self.inner.registrations.lock().is_empty() {
            return Err(PushError::registration("message", "no active worker"));
        }
        self.inner.worker_inbox.lock().push(message);
        Ok(())
    }
}

impl PushProvider for SimulatedBrowser {
    fn is_available(&self) -> bool {
        self.inner.provider_available.load(Ordering::SeqCst)
    }

    fn requires_server_key(&self) -> bool {
        self.inner.requires_server_key.load(Ordering::SeqCst)
    }

    fn get_token<'a>(
        &'a self,
        _registration: &'a WorkerHandle,
        server_key: Option<&'a str>,
    ) -> PlatformFuture<'a, PushResult<Option<DeliveryToken>>> {
        Box::pin(async move {
            self.inner.get_token_calls.fetch_add(1, Ordering::SeqCst);
            self.inner
                .server_keys_seen
                .lock()
                .push(server_key.map(str::to_string));
            if self.inner.fail_token.load(Ordering::SeqCst) {
                return Err(PushError::registration("token", "provider unreachable"));
            }
            let mut token = self.inner.token.lock();
            if token.is_none() {
                *token = Some(self.mint_token());
            }
            Ok(token.clone())
        })
    }

    fn current_token(&self) -> PlatformFuture<'_, PushResult<Option<DeliveryToken>>> {
        Box::pin(async move { Ok(self.inner.token.lock().clone()) })
    }

    fn delete_token<'a>(&'a self, token: &'a DeliveryToken) -> PlatformFuture<'a, PushResult<()>> {
        Box::pin(async move {
            if self.inner.fail_delete_token.load(Ordering::SeqCst) {
                return Err(PushError::registration("token", "provider refused deletion"));
            }
            let mut current = self.inner.token.lock();
            if current.as_ref() == Some(token) {
                *current = None;
            }
            Ok(())
        })
    }
}

impl WorkerScope for SimulatedBrowser {
    fn skip_waiting(&self) -> PlatformFuture<'_, PushResult<()>> {
        Box::pin(async move {
            self.inner.skip_waiting_count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn claim_clients(&self) -> PlatformFuture<'_, PushResult<()>> {
        Box::pin(async move {
            self.inner.claim_count.fetch_add(1, Ordering::SeqCst);
            for client in self.inner.clients.lock().iter_mut() {
                client.controlled = true;
            }
            Ok(())
        })
    }
}

impl CacheStorage for SimulatedBrowser {
    fn keys(&self) -> PlatformFuture<'_, PushResult<Vec<String>>> {
        Box::pin(async move { Ok(self.cache_names()) })
    }

    fn delete<'a>(&'a self, name: &'a str) -> PlatformFuture<'a, PushResult<bool>> {
        Box::pin(async move { Ok(self.inner.caches.lock().remove(name)) })
    }
}

impl WindowClients for SimulatedBrowser {
    fn match_all(
        &self,
        include_uncontrolled: bool,
    ) -> PlatformFuture<'_, PushResult<Vec<WindowClient>>> {
        Box::pin(async move {
            Ok(self
                .inner
                .clients
                .lock()
                .iter()
                .filter(|client| include_uncontrolled || client.controlled)
                .cloned()
                .collect())
        })
    }

    fn focus(&self, id: ClientId) -> PlatformFuture<'_, PushResult<()>> {
        Box::pin(async move {
            let mut clients = self.inner.clients.lock();
            if !clients.iter().any(|client| client.id == id) {
                return Err(PushError::registration("focus", format!("no window client {id}")));
            }
            for client in clients.iter_mut() {
                client.focused = client.id == id;
            }
            self.inner.focused_clients.lock().push(id);
            Ok(())
        })
    }

    fn open_window<'a>(
        &'a self,
        url: &'a str,
    ) -> PlatformFuture<'a, PushResult<Option<WindowClient>>> {
        Box::pin(async move {
            let client = WindowClient {
                id: ClientId::generate(),
                url: url.to_string(),
                controlled: true,
                focused: true,
            };
            let mut clients = self.inner.clients.lock();
            for other in clients.iter_mut() {
                other.focused = false;
            }
            clients.push(client.clone());
            self.inner.opened_windows.lock().push(url.to_string());
            Ok(Some(client))
        })
    }

    fn post_message(&self, id: ClientId, message: Value) -> PushResult<()> {
        if !self.inner.clients.lock().iter().any(|client| client.id == id) {
            return Err(PushError::registration("message", format!("no window client {id}")));
        }
        // A send error only means no page is listening right now
        let _ = self.inner.page_channel.send(message);
        Ok(())
    }
}

impl NotificationSurface for SimulatedBrowser {
    fn show<'a>(
        &'a self,
        spec: &'a NotificationSpec,
    ) -> PlatformFuture<'a, PushResult<NotificationId>> {
        Box::pin(async move {
            let id = NotificationId::generate();
            self.inner.shown.lock().push((id, spec.clone()));
            Ok(id)
        })
    }

    fn close(&self, id: NotificationId) -> PushResult<()> {
        self.inner.closed.lock().push(id);
        Ok(())
    }
}

impl PageWindow for SimulatedBrowser {
    fn focus(&self) -> PushResult<()> {
        self.inner.page_focus_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn navigate(&self, url: &str) -> PushResult<()> {
        self.inner.navigations.lock().push(url.to_string());
        Ok(())
    }
}

struct RegistryInner {
    records: Mutex<BTreeSet<String>>,
    posted: Mutex<Vec<String>>,
    subscribe_calls: AtomicUsize,
    unsubscribe_calls: AtomicUsize,
    vapid_calls: AtomicUsize,
    delay: Mutex<Duration>,
    fail: AtomicBool,
    vapid_key: Mutex<Option<String>>,
}

/// Registry keeping token records in memory with upsert semantics
#[derive(Clone)]
pub struct InMemoryRegistry {
    inner: Arc<RegistryInner>,
}

impl Default for InMemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                records: Mutex::new(BTreeSet::new()),
                posted: Mutex::new(Vec::new()),
                subscribe_calls: AtomicUsize::new(0),
                unsubscribe_calls: AtomicUsize::new(0),
                vapid_calls: AtomicUsize::new(0),
                delay: Mutex::new(Duration::ZERO),
                fail: AtomicBool::new(false),
                vapid_key: Mutex::new(None),
            }),
        }
    }

    pub fn with_vapid_key(key: impl Into<String>) -> Self {
        let registry = Self::new();
        *registry.inner.vapid_key.lock() = Some(key.into());
        registry
    }

    /// Latency added to every request
    pub fn set_delay(&self, delay: Duration) {
        *self.inner.delay.lock() = delay;
    }

    /// Reject every request with a server error
    pub fn set_failing(&self, fail: bool) {
        self.inner.fail.store(fail, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<String> {
        self.inner.records.lock().iter().cloned().collect()
    }

    pub fn contains(&self, token: &str) -> bool {
        self.inner.records.lock().contains(token)
    }

    /// Every token value posted to subscribe, in order
    pub fn posted_tokens(&self) -> Vec<String> {
        self.inner.posted.lock().clone()
    }

    pub fn subscribe_calls(&self) -> usize {
        self.inner.subscribe_calls.load(Ordering::SeqCst)
    }

    pub fn unsubscribe_calls(&self) -> usize {
        self.inner.unsubscribe_calls.load(Ordering::SeqCst)
    }

    pub fn vapid_calls(&self) -> usize {
        self.inner.vapid_calls.load(Ordering::SeqCst)
    }

    /// Total requests of any kind
    pub fn request_count(&self) -> usize {
        self.subscribe_calls() + self.unsubscribe_calls() + self.vapid_calls()
    }

    async fn round_trip(&self, operation: &str) -> PushResult<()> {
        let delay = *self.inner.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.inner.fail.load(Ordering::SeqCst) {
            return Err(PushError::Registry {
                operation: operation.to_string(),
                status: 500,
                message: "registry unavailable".to_string(),
            });
        }
        Ok(())
    }
}

impl SubscriptionRegistry for InMemoryRegistry {
    fn subscribe<'a>(&'a self, token: &'a DeliveryToken) -> PlatformFuture<'a, PushResult<()>> {
        Box::pin(async move {
            self.inner.subscribe_calls.fetch_add(1, Ordering::SeqCst);
            self.round_trip("subscribe").await?;
            self.inner.posted.lock().push(token.as_str().to_string());
            self.inner.records.lock().insert(token.as_str().to_string());
            Ok(())
        })
    }

    fn unsubscribe<'a>(&'a self, token: &'a DeliveryToken) -> PlatformFuture<'a, PushResult<()>> {
        Box::pin(async move {
            self.inner.unsubscribe_calls.fetch_add(1, Ordering::SeqCst);
            self.round_trip("unsubscribe").await?;
            self.inner.records.lock().remove(token.as_str());
            Ok(())
        })
    }

    fn vapid_public_key(&self) -> PlatformFuture<'_, PushResult<Option<String>>> {
        Box::pin(async move {
            self.inner.vapid_calls.fetch_add(1, Ordering::SeqCst);
            self.round_trip("vapid-public-key").await?;
            Ok(self.inner.vapid_key.lock().clone())
        })
    }
}
