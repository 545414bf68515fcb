// Push payload wire model and rendered notification description
// Every field is optional on the wire; client-side defaults fill the gaps

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::{NotificationId, PushResult};

pub const DEFAULT_TITLE: &str = "New Notification";
pub const DEFAULT_BODY: &str = "You have a new notification";
pub const DEFAULT_ICON: &str = "/icon-192x192.png";
pub const DEFAULT_BADGE: &str = "/badge-72x72.png";
pub const DEFAULT_TAG: &str = "default";
pub const VIBRATE_PATTERN: [u32; 3] = [200, 100, 200];

pub const ACTION_OPEN: &str = "open";
pub const ACTION_CLOSE: &str = "close";

/// Inbound push payload.
///
/// Provider shape: `{ notification: { title, body, icon }, data: { tag, url, requireInteraction } }`.
/// The flat web-push shape (`{ title, body, icon, badge, tag, requireInteraction, data }`)
/// is accepted as well; nested `notification` fields win over flat ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification: Option<NotificationFields>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<PayloadData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub badge: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(
        default,
        deserialize_with = "flexible_flag",
        skip_serializing_if = "Option::is_none"
    )]
    pub require_interaction: Option<bool>,
}

/// Display fields of the provider shape
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

/// Data attached to a notification; `url` is the only navigation target
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(
        default,
        deserialize_with = "flexible_flag",
        skip_serializing_if = "Option::is_none"
    )]
    pub require_interaction: Option<bool>,
    /// Any other application data, passed through untouched
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl PayloadData {
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }
}

/// Provider data maps are string-valued, so `"true"` counts as a set flag
fn flexible_flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Bool(flag)) => Some(flag),
        Some(Value::String(text)) => Some(text.trim().eq_ignore_ascii_case("true")),
        Some(Value::Number(number)) => Some(number.as_i64() == Some(1)),
        _ => None,
    })
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|text| !text.trim().is_empty())
}

impl PushPayload {
    pub fn from_slice(bytes: &[u8]) -> PushResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn from_value(value: Value) -> PushResult<Self> {
        Ok(serde_json::from_value(value)?)
    }

    fn nested(&self) -> Option<&NotificationFields> {
        self.notification.as_ref()
    }

    pub fn title(&self) -> &str {
        non_empty(self.nested().and_then(|n| n.title.as_ref()))
            .or_else(|| non_empty(self.title.as_ref()))
            .unwrap_or(DEFAULT_TITLE)
    }

    pub fn body(&self) -> &str {
        non_empty(self.nested().and_then(|n| n.body.as_ref()))
            .or_else(|| non_empty(self.body.as_ref()))
            .unwrap_or(DEFAULT_BODY)
    }

    pub fn icon(&self) -> &str {
        non_empty(self.nested().and_then(|n| n.icon.as_ref()))
            .or_else(|| non_empty(self.icon.as_ref()))
            .unwrap_or(DEFAULT_ICON)
    }

    pub fn badge(&self) -> &str {
        non_empty(self.badge.as_ref()).unwrap_or(DEFAULT_BADGE)
    }

    pub fn tag(&self) -> &str {
        non_empty(self.data.as_ref().and_then(|d| d.tag.as_ref()))
            .or_else(|| non_empty(self.tag.as_ref()))
            .unwrap_or(DEFAULT_TAG)
    }

    pub fn require_interaction(&self) -> bool {
        self.data
            .as_ref()
            .and_then(|d| d.require_interaction)
            .or(self.require_interaction)
            .unwrap_or(false)
    }

    /// Click target for this payload, `default_url` when none is attached
    pub fn target_url(&self, default_url: &str) -> String {
        resolve_target_url(self.data.as_ref(), default_url)
    }
}

/// Resolve a click target from attached data. Never yields an empty target.
pub fn resolve_target_url(data: Option<&PayloadData>, default_url: &str) -> String {
    non_empty(data.and_then(|d| d.url.as_ref()))
        .unwrap_or(default_url)
        .to_string()
}

/// Button attached to a rendered notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
}

impl NotificationAction {
    pub fn new(action: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            title: title.into(),
        }
    }

    /// The two actions every pipeline notification carries
    pub fn standard() -> Vec<Self> {
        vec![
            Self::new(ACTION_OPEN, "View"),
            Self::new(ACTION_CLOSE, "Close"),
        ]
    }
}

/// Fully resolved notification handed to a [`NotificationSurface`](super::platform::NotificationSurface)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSpec {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub tag: String,
    pub require_interaction: bool,
    pub vibrate: Vec<u32>,
    pub data: PayloadData,
    pub actions: Vec<NotificationAction>,
}

impl NotificationSpec {
    pub fn from_payload(payload: &PushPayload) -> Self {
        Self {
            title: payload.title().to_string(),
            body: payload.body().to_string(),
            icon: payload.icon().to_string(),
            badge: payload.badge().to_string(),
            tag: payload.tag().to_string(),
            require_interaction: payload.require_interaction(),
            vibrate: VIBRATE_PATTERN.to_vec(),
            data: payload.data.clone().unwrap_or_default(),
            actions: NotificationAction::standard(),
        }
    }

    /// Notification shown when a payload is missing or unreadable
    pub fn fallback() -> Self {
        Self::from_payload(&PushPayload::default())
    }

    pub fn target_url(&self, default_url: &str) -> String {
        resolve_target_url(Some(&self.data), default_url)
    }
}

/// A notification the surface accepted, as delivered back on click
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShownNotification {
    pub id: NotificationId,
    pub spec: NotificationSpec,
}
