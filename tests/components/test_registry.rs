//! Tests for backends/registry.rs against a fake registry server

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use kodegen_push_notify::{DeliveryToken, HttpRegistry, PushError, SubscriptionRegistry};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio_test::assert_ok;
use url::Url;

use crate::common::setup_tracing;

#[derive(Clone, Default)]
struct FakeRegistry {
    subscribed: Arc<Mutex<Vec<Value>>>,
    unsubscribed: Arc<Mutex<Vec<Value>>>,
    user_agents: Arc<Mutex<Vec<String>>>,
}

async fn subscribe(
    State(fake): State<FakeRegistry>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if let Some(agent) = headers.get("user-agent").and_then(|v| v.to_str().ok()) {
        fake.user_agents.lock().push(agent.to_string());
    }
    if body["fcm_token"].as_str().unwrap_or_default().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "fcm_token is required" })),
        );
    }
    if body["fcm_token"] == "revoked" {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": "token revoked by provider" })),
        );
    }
    fake.subscribed.lock().push(body);
    (StatusCode::CREATED, Json(json!({ "success": true })))
}

async fn unsubscribe(State(fake): State<FakeRegistry>, Json(body): Json<Value>) -> StatusCode {
    let known = fake
        .subscribed
        .lock()
        .iter()
        .any(|record| record["fcm_token"] == body["fcm_token"]);
    fake.unsubscribed.lock().push(body);
    if known {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn vapid_key() -> Json<Value> {
    Json(json!({ "publicKey": "BEl62iUYgUivxIkv69yViEuiBIa" }))
}

async fn serve(router: Router) -> Url {
    setup_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    Url::parse(&format!("http://{addr}/api")).unwrap()
}

async fn fake_registry() -> (FakeRegistry, Url) {
    let fake = FakeRegistry::default();
    let router = Router::new()
        .route("/api/push/subscribe", post(subscribe))
        .route("/api/push/unsubscribe", post(unsubscribe))
        .route("/api/push/vapid-public-key", get(vapid_key))
        .with_state(fake.clone());
    (fake, serve(router).await)
}

fn client(base: &Url, legacy_endpoint_field: bool) -> HttpRegistry {
    HttpRegistry::new(
        base,
        Duration::from_secs(5),
        Duration::from_secs(5),
        legacy_endpoint_field,
    )
    .unwrap()
}

#[tokio::test]
async fn test_subscribe_posts_token_with_legacy_mirror() {
    let (fake, base) = fake_registry().await;
    let registry = client(&base, true);

    assert_ok!(registry.subscribe(&DeliveryToken::new("T1")).await);

    let bodies = fake.subscribed.lock().clone();
    assert_eq!(bodies, vec![json!({ "fcm_token": "T1", "endpoint": "T1" })]);
    let agents = fake.user_agents.lock().clone();
    assert!(agents[0].starts_with("KODEGEN-Push/"));
}

#[tokio::test]
async fn test_subscribe_without_legacy_field() {
    let (fake, base) = fake_registry().await;
    let registry = client(&base, false);

    assert_ok!(registry.subscribe(&DeliveryToken::new("T1")).await);
    assert_eq!(fake.subscribed.lock()[0], json!({ "fcm_token": "T1" }));
}

#[tokio::test]
async fn test_rejection_surfaces_server_error_message() {
    let (_fake, base) = fake_registry().await;
    let registry = client(&base, true);

    let error = registry
        .subscribe(&DeliveryToken::new("revoked"))
        .await
        .unwrap_err();
    match error {
        PushError::Registry {
            status, message, ..
        } => {
            assert_eq!(status, 422);
            assert_eq!(message, "token revoked by provider");
        },
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_unsubscribe_treats_missing_record_as_success() {
    let (fake, base) = fake_registry().await;
    let registry = client(&base, true);
    let token = DeliveryToken::new("never-registered");

    assert_ok!(registry.unsubscribe(&token).await);
    assert_eq!(
        fake.unsubscribed.lock()[0],
        json!({ "fcm_token": "never-registered", "endpoint": "never-registered" })
    );
}

#[tokio::test]
async fn test_subscribe_then_unsubscribe() {
    let (fake, base) = fake_registry().await;
    let registry = client(&base, true);
    let token = DeliveryToken::new("T9");

    assert_ok!(registry.subscribe(&token).await);
    assert_ok!(registry.unsubscribe(&token).await);
    assert_eq!(fake.unsubscribed.lock().len(), 1);
}

#[tokio::test]
async fn test_vapid_key_is_read() {
    let (_fake, base) = fake_registry().await;
    let registry = client(&base, true);

    let key = registry.vapid_public_key().await.unwrap();
    assert_eq!(key.as_deref(), Some("BEl62iUYgUivxIkv69yViEuiBIa"));
}

#[tokio::test]
async fn test_missing_vapid_route_means_no_key() {
    let base = serve(Router::new()).await;
    let registry = client(&base, true);

    assert_eq!(registry.vapid_public_key().await.unwrap(), None);
    assert!(matches!(
        registry.subscribe(&DeliveryToken::new("T1")).await,
        Err(PushError::Registry { status: 404, .. })
    ));
}

#[tokio::test]
async fn test_unreachable_registry_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let base = Url::parse(&format!("http://{addr}/api")).unwrap();
    let registry = client(&base, true);

    let error = registry
        .subscribe(&DeliveryToken::new("T1"))
        .await
        .unwrap_err();
    assert!(matches!(error, PushError::Transport { .. }));
    assert!(error.is_transient());
}
