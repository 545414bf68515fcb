// Notification permission negotiation
// Three-valued permission state, fail-fast on denial, and the one-shot user gesture gate

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

use super::platform::PermissionBackend;
use super::state::SubscriptionStore;
use super::PushError;

/// Platform notification permission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    /// Not yet decided; the platform prompt may be shown
    #[default]
    Default,
    Granted,
    /// Refused; only a manual platform settings change can undo it
    Denied,
}

impl PermissionState {
    pub fn is_granted(&self) -> bool {
        matches!(self, PermissionState::Granted)
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, PermissionState::Denied)
    }

    /// Only an undecided permission may show the platform prompt
    pub fn can_prompt(&self) -> bool {
        matches!(self, PermissionState::Default)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionState::Default => "default",
            PermissionState::Granted => "granted",
            PermissionState::Denied => "denied",
        }
    }
}

impl std::fmt::Display for PermissionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PermissionState {
    type Err = PushError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(PermissionState::Default),
            "granted" => Ok(PermissionState::Granted),
            "denied" => Ok(PermissionState::Denied),
            other => Err(PushError::Payload {
                message: format!("unknown permission state '{other}'"),
            }),
        }
    }
}

/// Page interaction reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InteractionKind {
    Click,
    TouchStart,
    KeyDown,
    PointerMove,
    Scroll,
    Wheel,
}

impl InteractionKind {
    /// Platforms only honour permission prompts raised from these
    pub fn is_user_gesture(&self) -> bool {
        matches!(
            self,
            InteractionKind::Click | InteractionKind::TouchStart | InteractionKind::KeyDown
        )
    }
}

/// One-shot listener for the first qualifying user gesture.
///
/// Armed while permission is undecided. The first click, touch or key press
/// disarms it, so later interactions never reach the prompt again.
#[derive(Debug, Default)]
pub struct GestureGate {
    armed: AtomicBool,
}

impl GestureGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the gate was not armed before
    pub fn arm(&self) -> bool {
        !self.armed.swap(true, Ordering::AcqRel)
    }

    pub fn disarm(&self) {
        self.armed.store(false, Ordering::Release);
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    /// Consume the gate if `kind` is a genuine gesture. Fires at most once per arming.
    pub fn fire(&self, kind: InteractionKind) -> bool {
        if !kind.is_user_gesture() {
            return false;
        }
        self.armed.swap(false, Ordering::AcqRel)
    }
}

/// Permission negotiator for the page context
pub struct PermissionNegotiator {
    backend: Arc<dyn PermissionBackend>,
    store: SubscriptionStore,
    gate: GestureGate,
}

impl PermissionNegotiator {
    pub fn new(backend: Arc<dyn PermissionBackend>, store: SubscriptionStore) -> Self {
        Self {
            backend,
            store,
            gate: GestureGate::new(),
        }
    }

    pub fn permission(&self) -> PermissionState {
        self.store.permission()
    }

    pub fn gesture_gate(&self) -> &GestureGate {
        &self.gate
    }

    /// Re-read the platform permission; external settings changes surface here.
    ///
    /// A failed query counts as `Denied` for this session.
    pub async fn refresh_permission(&self) -> PermissionState {
        if !self.store.is_supported() {
            return self.store.permission();
        }

        let permission = match self.backend.query().await {
            Ok(permission) => permission,
            Err(e) => {
                tracing::warn!(error = %e, "Permission query failed; treating as denied");
                PermissionState::Denied
            },
        };
        self.store.set_permission(permission);
        if !permission.can_prompt() {
            self.gate.disarm();
        }
        permission
    }

    /// Ask for notification permission. Returns `true` iff it is granted.
    ///
    /// A denied permission fails fast without showing the prompt; the user has
    /// to re-enable notifications in platform settings.
    pub async fn request_permission(&self) -> bool {
        if !self.store.is_supported() {
            tracing::debug!("Push notifications not supported; skipping permission request");
            return false;
        }

        match self.refresh_permission().await {
            PermissionState::Granted => return true,
            PermissionState::Denied => {
                tracing::info!(
                    "Notification permission is blocked; it must be re-enabled in platform settings"
                );
                return false;
            },
            PermissionState::Default => {},
        }

        let permission = match self.backend.request().await {
            Ok(permission) => permission,
            Err(e) => {
                tracing::error!(error = %e, "Error requesting notification permission");
                PermissionState::Denied
            },
        };
        self.store.set_permission(permission);
        if !permission.can_prompt() {
            self.gate.disarm();
        }
        tracing::info!(permission = %permission, "Notification permission resolved");
        permission.is_granted()
    }

    /// Arm the gesture gate while permission is still undecided
    pub fn arm_gesture_gate(&self) -> bool {
        if !self.store.is_supported() || !self.store.permission().can_prompt() {
            return false;
        }
        let newly_armed = self.gate.arm();
        if newly_armed {
            tracing::debug!("Waiting for a user gesture before prompting for permission");
        }
        newly_armed
    }

    /// Feed a page interaction. Returns the prompt outcome when this
    /// interaction consumed the gate, `None` otherwise.
    pub async fn on_interaction(&self, kind: InteractionKind) -> Option<bool> {
        if !self.gate.fire(kind) {
            return None;
        }
        tracing::debug!(interaction = ?kind, "User gesture received; requesting permission");
        Some(self.request_permission().await)
    }
}
