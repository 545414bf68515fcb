// Typed worker <-> page messages
// Raw structured values cross the context boundary; each end validates the tag before acting

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::{DeliveryToken, PushError, PushResult};

pub const TOKEN_REFRESH_TYPE: &str = "FCM_TOKEN_REFRESH";
pub const SKIP_WAITING_TYPE: &str = "SKIP_WAITING";

/// Messages exchanged between the worker and its pages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkerMessage {
    /// Worker → page: the provider rotated the token out of band
    #[serde(rename = "FCM_TOKEN_REFRESH")]
    TokenRefresh { token: DeliveryToken },
    /// Page → worker: activate a waiting worker immediately
    #[serde(rename = "SKIP_WAITING")]
    SkipWaiting,
}

impl WorkerMessage {
    /// Validate a raw message. Unknown tags and empty tokens are rejected.
    pub fn from_value(value: &Value) -> PushResult<Self> {
        let message = WorkerMessage::deserialize(value).map_err(|e| PushError::Payload {
            message: format!("unrecognized worker message: {e}"),
        })?;

        if let WorkerMessage::TokenRefresh { token } = &message
            && token.is_empty()
        {
            return Err(PushError::Payload {
                message: "token refresh message carries an empty token".to_string(),
            });
        }

        Ok(message)
    }

    pub fn to_value(&self) -> Value {
        match self {
            WorkerMessage::TokenRefresh { token } => {
                json!({ "type": TOKEN_REFRESH_TYPE, "token": token.as_str() })
            },
            WorkerMessage::SkipWaiting => json!({ "type": SKIP_WAITING_TYPE }),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            WorkerMessage::TokenRefresh { .. } => TOKEN_REFRESH_TYPE,
            WorkerMessage::SkipWaiting => SKIP_WAITING_TYPE,
        }
    }
}
