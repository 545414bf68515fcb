// Page-side worker registration and supervision
// One registration per scope, cached for the session; readiness awaited separately

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{OnceCell, broadcast};
use uuid::Uuid;

use super::messages::WorkerMessage;
use super::platform::WorkerContainer;

/// Handle to a registered background worker
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerHandle {
    pub id: Uuid,
    pub script_url: String,
    pub scope: String,
}

impl WorkerHandle {
    pub fn new(script_url: impl Into<String>, scope: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            script_url: script_url.into(),
            scope: scope.into(),
        }
    }

    /// Whether a page at `path` falls under this registration's scope
    pub fn controls(&self, path: &str) -> bool {
        path.starts_with(&self.scope)
    }
}

/// Installs and supervises the background worker for the page
pub struct WorkerRegistrationManager {
    container: Arc<dyn WorkerContainer>,
    script_url: String,
    scope: String,
    ready_timeout: Duration,
    registration: OnceCell<WorkerHandle>,
}

impl WorkerRegistrationManager {
    pub fn new(
        container: Arc<dyn WorkerContainer>,
        script_url: impl Into<String>,
        scope: impl Into<String>,
        ready_timeout: Duration,
    ) -> Self {
        Self {
            container,
            script_url: script_url.into(),
            scope: scope.into(),
            ready_timeout,
            registration: OnceCell::new(),
        }
    }

    pub fn is_available(&self) -> bool {
        self.container.is_available()
    }

    /// Registration cached from an earlier successful call
    pub fn registration(&self) -> Option<WorkerHandle> {
        self.registration.get().cloned()
    }

    /// Register the worker, or return the existing registration.
    ///
    /// `None` means push is unavailable for this session. Failures are not
    /// cached, so the next user-triggered subscribe tries again.
    pub async fn register_worker(&self) -> Option<WorkerHandle> {
        if !self.container.is_available() {
            tracing::debug!("Worker container unavailable; push disabled for this session");
            return None;
        }

        let result = self
            .registration
            .get_or_try_init(|| async {
                let handle = self.container.register(&self.script_url, &self.scope).await?;
                tracing::info!(
                    script = %handle.script_url,
                    scope = %handle.scope,
                    "Service worker registered"
                );
                Ok::<_, super::PushError>(handle)
            })
            .await;

        match result {
            Ok(handle) => Some(handle.clone()),
            Err(e) => {
                tracing::error!(
                    error = %e,
                    script = %self.script_url,
                    scope = %self.scope,
                    "Service worker registration failed"
                );
                None
            },
        }
    }

    /// Wait for the registration to have an active worker, bounded by the readiness timeout
    pub async fn wait_ready(&self, handle: &WorkerHandle) -> bool {
        match tokio::time::timeout(self.ready_timeout, self.container.ready(handle)).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, scope = %handle.scope, "Service worker failed to become ready");
                false
            },
            Err(_) => {
                tracing::warn!(
                    scope = %handle.scope,
                    timeout = ?self.ready_timeout,
                    "Service worker not ready before timeout"
                );
                false
            },
        }
    }

    /// Register if needed and wait for readiness
    pub async fn ensure_ready(&self) -> Option<WorkerHandle> {
        let handle = self.register_worker().await?;
        self.wait_ready(&handle).await.then_some(handle)
    }

    /// Messages posted by the worker to this page
    pub fn messages(&self) -> broadcast::Receiver<Value> {
        self.container.subscribe_messages()
    }

    /// Ask a waiting worker to activate now
    pub fn request_skip_waiting(&self) -> bool {
        match self.container.post_to_worker(WorkerMessage::SkipWaiting.to_value()) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to post skip-waiting request to worker");
                false
            },
        }
    }
}
