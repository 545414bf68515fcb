// HTTP client for the backend subscription registry
// Cookie-carrying reqwest client; routes live under `{api_base}/push/`

use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::components::{DeliveryToken, PlatformFuture, PushError, PushResult, SubscriptionRegistry};

const SUBSCRIBE_PATH: &str = "push/subscribe";
const UNSUBSCRIBE_PATH: &str = "push/unsubscribe";
const VAPID_KEY_PATH: &str = "push/vapid-public-key";

/// Request body for subscribe and unsubscribe
#[derive(Debug, Serialize)]
struct TokenBody<'a> {
    fcm_token: &'a str,
    /// Deprecated mirror of `fcm_token` kept for older registry deployments
    #[serde(skip_serializing_if = "Option::is_none")]
    endpoint: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VapidKeyBody {
    public_key: Option<String>,
}

/// Registry client speaking the backend's JSON API
#[derive(Debug, Clone)]
pub struct HttpRegistry {
    client: reqwest::Client,
    base: Url,
    timeout: Duration,
    legacy_endpoint_field: bool,
}

impl HttpRegistry {
    /// Build a client rooted at `api_base` (e.g. `https://crm.example.com/api`)
    pub fn new(
        api_base: &Url,
        timeout: Duration,
        connect_timeout: Duration,
        legacy_endpoint_field: bool,
    ) -> PushResult<Self> {
        let client = build_client(timeout, connect_timeout)
            .map_err(|e| PushError::config("http_client", e.to_string()))?;

        Ok(Self {
            client,
            base: normalize_base(api_base),
            timeout,
            legacy_endpoint_field,
        })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> PushResult<Url> {
        Ok(self.base.join(path)?)
    }

    fn body<'a>(&self, token: &'a DeliveryToken) -> TokenBody<'a> {
        TokenBody {
            fcm_token: token.as_str(),
            endpoint: self.legacy_endpoint_field.then_some(token.as_str()),
        }
    }

    fn transport_error(&self, operation: &str, error: reqwest::Error) -> PushError {
        if error.is_timeout() {
            PushError::Timeout {
                operation: operation.to_string(),
                timeout: self.timeout,
            }
        } else {
            PushError::Transport {
                operation: operation.to_string(),
                message: error.to_string(),
            }
        }
    }

    async fn post_token(&self, path: &str, token: &DeliveryToken, allow_missing: bool) -> PushResult<()> {
        let url = self.endpoint(path)?;
        let response = with_credentials(self.client.post(url.clone()).json(&self.body(token)))
            .send()
            .await
            .map_err(|e| self.transport_error(path, e))?;

        let status = response.status();
        if status.is_success() || (allow_missing && status == StatusCode::NOT_FOUND) {
            tracing::debug!(url = %url, status = status.as_u16(), token = %token, "Registry accepted request");
            return Ok(());
        }

        Err(rejection(path, status, response).await)
    }
}

impl SubscriptionRegistry for HttpRegistry {
    fn subscribe<'a>(&'a self, token: &'a DeliveryToken) -> PlatformFuture<'a, PushResult<()>> {
        Box::pin(self.post_token(SUBSCRIBE_PATH, token, false))
    }

    fn unsubscribe<'a>(&'a self, token: &'a DeliveryToken) -> PlatformFuture<'a, PushResult<()>> {
        Box::pin(self.post_token(UNSUBSCRIBE_PATH, token, true))
    }

    fn vapid_public_key(&self) -> PlatformFuture<'_, PushResult<Option<String>>> {
        Box::pin(async move {
            let url = self.endpoint(VAPID_KEY_PATH)?;
            let response = with_credentials(self.client.get(url))
                .send()
                .await
                .map_err(|e| self.transport_error(VAPID_KEY_PATH, e))?;

            let status = response.status();
            if status == StatusCode::NOT_FOUND {
                return Ok(None);
            }
            if !status.is_success() {
                return Err(rejection(VAPID_KEY_PATH, status, response).await);
            }

            let body: VapidKeyBody = response.json().await?;
            Ok(body.public_key.filter(|key| !key.trim().is_empty()))
        })
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn build_client(timeout: Duration, connect_timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(connect_timeout)
        .cookie_store(true)
        .user_agent(concat!("KODEGEN-Push/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// The browser's fetch owns timeouts, cookies and the user agent
#[cfg(target_arch = "wasm32")]
fn build_client(_timeout: Duration, _connect_timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder().build()
}

#[cfg(not(target_arch = "wasm32"))]
fn with_credentials(request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
    request
}

#[cfg(target_arch = "wasm32")]
fn with_credentials(request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
    request.fetch_credentials_include()
}

/// Ensure `Url::join` appends to the base path instead of replacing its last segment
fn normalize_base(api_base: &Url) -> Url {
    let mut base = api_base.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base
}

async fn rejection(operation: &str, status: StatusCode, response: reqwest::Response) -> PushError {
    let message = match response.json::<ErrorBody>().await {
        Ok(ErrorBody { error: Some(error) }) => error,
        _ => status
            .canonical_reason()
            .unwrap_or("request rejected")
            .to_string(),
    };
    tracing::warn!(operation, status = status.as_u16(), error = %message, "Registry rejected request");
    PushError::Registry {
        operation: operation.to_string(),
        status: status.as_u16(),
        message,
    }
}
