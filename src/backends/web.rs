// Browser page capabilities for wasm32 targets
// JS handles stay on the main thread; async calls run there via spawn_local

use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;

use js_sys::{JSON, Reflect};
use serde_json::Value;
use tokio::sync::{broadcast, oneshot};
use wasm_bindgen::JsCast;
use wasm_bindgen::JsValue;
use wasm_bindgen::closure::Closure;
use wasm_bindgen_futures::JsFuture;
use web_sys::{
    MessageEvent, Notification, NotificationOptions, NotificationPermission, RegistrationOptions,
    ServiceWorkerContainer, ServiceWorkerRegistration,
};

use crate::components::{
    NotificationId, NotificationSpec, NotificationSurface, PageWindow, PermissionBackend,
    PermissionState, PlatformFuture, PushError, PushResult, WorkerContainer, WorkerHandle,
};

const PAGE_CHANNEL_CAPACITY: usize = 32;

thread_local! {
    static SHOWN: RefCell<HashMap<NotificationId, Notification>> = RefCell::new(HashMap::new());
}

/// Page-context capabilities backed by `web_sys`.
///
/// Holds no JS values itself, so it can sit behind the `Send + Sync`
/// capability traits; the page message listener is installed once by
/// [`WebPlatform::new`].
#[derive(Clone)]
pub struct WebPlatform {
    page_channel: broadcast::Sender<Value>,
}

impl WebPlatform {
    pub fn new() -> Self {
        let (page_channel, _) = broadcast::channel(PAGE_CHANNEL_CAPACITY);
        if let Some(container) = service_worker_container() {
            let sender = page_channel.clone();
            let listener = Closure::<dyn FnMut(MessageEvent)>::new(move |event: MessageEvent| {
                match js_to_json(&event.data()) {
                    Ok(value) => {
                        let _ = sender.send(value);
                    },
                    Err(e) => tracing::debug!(error = %e, "Ignoring unreadable worker message"),
                }
            });
            container.set_onmessage(Some(listener.as_ref().unchecked_ref()));
            // Lives as long as the page
            listener.forget();
        } else {
            tracing::debug!("navigator.serviceWorker missing; worker messages disabled");
        }
        Self { page_channel }
    }
}

impl Default for WebPlatform {
    fn default() -> Self {
        Self::new()
    }
}

fn window() -> PushResult<web_sys::Window> {
    web_sys::window().ok_or_else(|| PushError::unsupported("window"))
}

fn service_worker_container() -> Option<ServiceWorkerContainer> {
    let navigator = web_sys::window()?.navigator();
    let value = Reflect::get(&navigator, &JsValue::from_str("serviceWorker")).ok()?;
    if value.is_undefined() || value.is_null() {
        return None;
    }
    value.dyn_into().ok()
}

fn describe(err: &JsValue) -> String {
    err.as_string().unwrap_or_else(|| format!("{err:?}"))
}

fn js_error(stage: &str, err: JsValue) -> PushError {
    PushError::registration(stage, describe(&err))
}

fn js_to_json(value: &JsValue) -> PushResult<Value> {
    let text: String = JSON::stringify(value)
        .map_err(|e| PushError::Payload {
            message: describe(&e),
        })?
        .into();
    Ok(serde_json::from_str(&text)?)
}

fn json_to_js(value: &Value) -> PushResult<JsValue> {
    JSON::parse(&serde_json::to_string(value)?).map_err(|e| PushError::Payload {
        message: describe(&e),
    })
}

fn permission_state(permission: NotificationPermission) -> PermissionState {
    match permission {
        NotificationPermission::Granted => PermissionState::Granted,
        NotificationPermission::Denied => PermissionState::Denied,
        _ => PermissionState::Default,
    }
}

/// Run `work` on the page's event loop and hand the result back over a `Send` channel
fn on_main_thread<T, F>(work: F) -> PlatformFuture<'static, PushResult<T>>
where
    T: Send + 'static,
    F: Future<Output = PushResult<T>> + 'static,
{
    let (tx, rx) = oneshot::channel();
    wasm_bindgen_futures::spawn_local(async move {
        let _ = tx.send(work.await);
    });
    Box::pin(async move {
        rx.await
            .unwrap_or_else(|_| Err(PushError::registration("browser", "page task dropped")))
    })
}

impl PermissionBackend for WebPlatform {
    fn is_available(&self) -> bool {
        web_sys::window()
            .is_some_and(|window| Reflect::has(&window, &JsValue::from_str("Notification")).unwrap_or(false))
    }

    fn query(&self) -> PlatformFuture<'_, PushResult<PermissionState>> {
        on_main_thread(async { Ok(permission_state(Notification::permission())) })
    }

    fn request(&self) -> PlatformFuture<'_, PushResult<PermissionState>> {
        on_main_thread(async {
            let promise = Notification::request_permission()
                .map_err(|_| PushError::unsupported("Notification.requestPermission"))?;
            let answer = JsFuture::from(promise)
                .await
                .map_err(|e| js_error("permission", e))?;
            Ok(match answer.as_string().as_deref() {
                Some("granted") => PermissionState::Granted,
                Some("denied") => PermissionState::Denied,
                _ => PermissionState::Default,
            })
        })
    }
}

impl WorkerContainer for WebPlatform {
    fn is_available(&self) -> bool {
        service_worker_container().is_some()
    }

    fn register<'a>(
        &'a self,
        script_url: &'a str,
        scope: &'a str,
    ) -> PlatformFuture<'a, PushResult<WorkerHandle>> {
        let (script_url, scope) = (script_url.to_string(), scope.to_string());
        on_main_thread(async move {
            let container =
                service_worker_container().ok_or_else(|| PushError::unsupported("serviceWorker"))?;
            let options = RegistrationOptions::new();
            options.set_scope(&scope);

            JsFuture::from(container.register_with_options(&script_url, &options))
                .await
                .map_err(|e| js_error("worker", e))?
                .dyn_into::<ServiceWorkerRegistration>()
                .map_err(|_| PushError::registration("worker", "serviceWorker.register returned no registration"))?;

            tracing::debug!(script = %script_url, scope = %scope, "Browser accepted worker registration");
            Ok(WorkerHandle::new(script_url, scope))
        })
    }

    fn ready<'a>(&'a self, _handle: &'a WorkerHandle) -> PlatformFuture<'a, PushResult<()>> {
        on_main_thread(async {
            let container =
                service_worker_container().ok_or_else(|| PushError::unsupported("serviceWorker"))?;
            let promise = container.ready().map_err(|e| js_error("ready", e))?;
            JsFuture::from(promise).await.map_err(|e| js_error("ready", e))?;
            Ok(())
        })
    }

    fn subscribe_messages(&self) -> broadcast::Receiver<Value> {
        self.page_channel.subscribe()
    }

    fn post_to_worker(&self, message: Value) -> PushResult<()> {
        let worker = service_worker_container()
            .and_then(|container| container.controller())
            .ok_or_else(|| PushError::registration("message", "page has no controlling worker"))?;
        worker
            .post_message(&json_to_js(&message)?)
            .map_err(|e| js_error("message", e))
    }
}

impl NotificationSurface for WebPlatform {
    fn show<'a>(
        &'a self,
        spec: &'a NotificationSpec,
    ) -> PlatformFuture<'a, PushResult<NotificationId>> {
        let spec = spec.clone();
        on_main_thread(async move {
            let options = NotificationOptions::new();
            options.set_body(&spec.body);
            options.set_icon(&spec.icon);
            options.set_badge(&spec.badge);
            options.set_tag(&spec.tag);
            options.set_require_interaction(spec.require_interaction);
            options.set_data(&json_to_js(&serde_json::to_value(&spec.data)?)?);

            let notification = Notification::new_with_options(&spec.title, &options)
                .map_err(|e| js_error("notification", e))?;
            let id = NotificationId::generate();
            SHOWN.with(|shown| shown.borrow_mut().insert(id, notification));
            Ok(id)
        })
    }

    fn close(&self, id: NotificationId) -> PushResult<()> {
        if let Some(notification) = SHOWN.with(|shown| shown.borrow_mut().remove(&id)) {
            notification.close();
        }
        Ok(())
    }
}

impl PageWindow for WebPlatform {
    fn focus(&self) -> PushResult<()> {
        window()?.focus().map_err(|e| js_error("focus", e))
    }

    fn navigate(&self, url: &str) -> PushResult<()> {
        window()?
            .location()
            .set_href(url)
            .map_err(|e| js_error("navigate", e))
    }
}
