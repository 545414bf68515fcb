// Push subscription pipeline components
// Permission negotiation, worker supervision, token lifecycle and message routing

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub mod messages;
pub mod payload;
pub mod permission;
pub mod platform;
pub mod refresh;
pub mod router;
pub mod service_worker;
pub mod state;
pub mod token;
pub mod worker;

pub use messages::{SKIP_WAITING_TYPE, TOKEN_REFRESH_TYPE, WorkerMessage};
pub use payload::{
    ACTION_CLOSE, ACTION_OPEN, NotificationAction, NotificationFields, NotificationSpec,
    PayloadData, PushPayload, ShownNotification, resolve_target_url,
};
pub use permission::{GestureGate, InteractionKind, PermissionNegotiator, PermissionState};
pub use platform::{
    CacheStorage, ClientId, NotificationSurface, PageWindow, PermissionBackend, PushProvider,
    SubscriptionRegistry, WindowClient, WindowClients, WorkerContainer, WorkerScope,
};
pub use refresh::RefreshScheduler;
pub use router::{
    DeliveryPath, ForegroundNotifier, ForegroundSubscription, MessageRouter, Visibility,
};
pub use service_worker::{ExtendableEvent, ServiceWorkerRuntime, WorkerEvent};
pub use state::{RegistrationGuard, SubscriptionState, SubscriptionStore};
pub use token::TokenLifecycleManager;
pub use worker::{WorkerHandle, WorkerRegistrationManager};

/// Boxed future returned by every platform capability.
///
/// Capabilities are used as trait objects (`Arc<dyn PushProvider>`), so their
/// async methods return a pinned box instead of an opaque `impl Future`.
pub type PlatformFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Globally unique identifier for a rendered notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationId(Uuid);

impl NotificationId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for NotificationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for NotificationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Opaque delivery token issued by the push provider.
///
/// Scoped to device + application + worker registration. `Display` and
/// `Debug` only show a short prefix so tokens never land in logs whole;
/// use [`DeliveryToken::as_str`] for the wire value.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeliveryToken(String);

impl DeliveryToken {
    const VISIBLE_PREFIX: usize = 8;

    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Short prefix suitable for log output
    pub fn redacted(&self) -> String {
        let prefix: String = self.0.chars().take(Self::VISIBLE_PREFIX).collect();
        if self.0.chars().count() > Self::VISIBLE_PREFIX {
            format!("{prefix}…")
        } else {
            prefix
        }
    }
}

impl std::fmt::Debug for DeliveryToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("DeliveryToken").field(&self.redacted()).finish()
    }
}

impl std::fmt::Display for DeliveryToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.redacted())
    }
}

/// Error taxonomy for the push pipeline.
///
/// Public agent operations never return these to UI code; they are converted
/// into a boolean outcome plus a log entry at the point of origin. Capability
/// implementations and the registry client return them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PushError {
    /// Platform lacks a required capability; permanent for the session
    #[error("Capability unavailable: {capability}")]
    Unsupported { capability: String },
    /// User refused notification permission
    #[error("Notification permission denied")]
    PermissionDenied,
    /// Worker registration or token acquisition failed
    #[error("Registration failed during {stage}: {message}")]
    Registration { stage: String, message: String },
    /// Backend registry rejected a request
    #[error("Registry rejected {operation} (status {status}): {message}")]
    Registry {
        operation: String,
        status: u16,
        message: String,
    },
    /// Network failure talking to the registry
    #[error("Transport error during {operation}: {message}")]
    Transport { operation: String, message: String },
    /// Operation exceeded its time budget
    #[error("Timeout in {operation} after {timeout:?}")]
    Timeout { operation: String, timeout: Duration },
    /// Malformed wire data (push payload, worker message, registry body)
    #[error("Malformed payload: {message}")]
    Payload { message: String },
    /// Invalid configuration value
    #[error("Invalid configuration for {field}: {message}")]
    Config { field: String, message: String },
}

impl PushError {
    pub fn unsupported(capability: impl Into<String>) -> Self {
        Self::Unsupported {
            capability: capability.into(),
        }
    }

    pub fn registration(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Registration {
            stage: stage.into(),
            message: message.into(),
        }
    }

    pub fn config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Whether retrying on the next trigger can succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PushError::Registration { .. }
                | PushError::Registry { .. }
                | PushError::Transport { .. }
                | PushError::Timeout { .. }
        )
    }
}

impl From<serde_json::Error> for PushError {
    fn from(error: serde_json::Error) -> Self {
        PushError::Payload {
            message: error.to_string(),
        }
    }
}

impl From<reqwest::Error> for PushError {
    fn from(error: reqwest::Error) -> Self {
        let operation = error
            .url()
            .map(|url| url.path().to_string())
            .unwrap_or_else(|| "request".to_string());
        if let Some(status) = error.status() {
            PushError::Registry {
                operation,
                status: status.as_u16(),
                message: error.to_string(),
            }
        } else if error.is_decode() {
            PushError::Payload {
                message: error.to_string(),
            }
        } else {
            PushError::Transport {
                operation,
                message: error.to_string(),
            }
        }
    }
}

impl From<url::ParseError> for PushError {
    fn from(error: url::ParseError) -> Self {
        PushError::config("url", error.to_string())
    }
}

/// Type alias for push pipeline results
pub type PushResult<T> = Result<T, PushError>;
