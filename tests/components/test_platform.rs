//! Tests for components/permission.rs and components/worker.rs against the simulated platform

use std::sync::Arc;
use std::time::Duration;

use kodegen_push_notify::components::{
    InteractionKind, PermissionNegotiator, PermissionState, SubscriptionStore,
    WorkerRegistrationManager,
};
use kodegen_push_notify::SimulatedBrowser;
use tokio_test::{assert_err, assert_ok};

fn negotiator(browser: &SimulatedBrowser) -> (PermissionNegotiator, SubscriptionStore) {
    let store = SubscriptionStore::new(true, PermissionState::Default);
    (
        PermissionNegotiator::new(Arc::new(browser.clone()), store.clone()),
        store,
    )
}

fn worker_manager(browser: &SimulatedBrowser) -> WorkerRegistrationManager {
    WorkerRegistrationManager::new(
        Arc::new(browser.clone()),
        "/sw.js",
        "/",
        Duration::from_millis(200),
    )
}

#[tokio::test]
async fn test_granted_permission_needs_no_prompt() {
    let browser = SimulatedBrowser::with_permission(PermissionState::Granted);
    let (negotiator, store) = negotiator(&browser);

    assert!(negotiator.request_permission().await);
    assert_eq!(browser.prompt_count(), 0);
    assert_eq!(store.permission(), PermissionState::Granted);
}

#[tokio::test]
async fn test_failed_query_counts_as_denied() {
    let browser = SimulatedBrowser::new();
    browser.set_fail_permission_query(true);
    let (negotiator, store) = negotiator(&browser);

    assert!(!negotiator.request_permission().await);
    assert_eq!(store.permission(), PermissionState::Denied);
    assert_eq!(browser.prompt_count(), 0);
}

#[tokio::test]
async fn test_gate_only_arms_while_undecided() {
    let browser = SimulatedBrowser::new();
    let (negotiator, _store) = negotiator(&browser);

    assert!(negotiator.arm_gesture_gate());
    assert!(!negotiator.arm_gesture_gate(), "already armed");
    assert_eq!(negotiator.on_interaction(InteractionKind::Wheel).await, None);
    assert_eq!(negotiator.on_interaction(InteractionKind::KeyDown).await, Some(true));
    assert!(!negotiator.arm_gesture_gate(), "permission decided");
}

#[tokio::test]
async fn test_external_decision_disarms_gate() {
    let browser = SimulatedBrowser::new();
    let (negotiator, _store) = negotiator(&browser);
    negotiator.arm_gesture_gate();

    browser.set_permission(PermissionState::Denied);
    negotiator.refresh_permission().await;

    assert!(!negotiator.gesture_gate().is_armed());
    assert_eq!(negotiator.on_interaction(InteractionKind::Click).await, None);
    assert_eq!(browser.prompt_count(), 0);
}

#[tokio::test]
async fn test_registration_is_cached() {
    let browser = SimulatedBrowser::new();
    let manager = worker_manager(&browser);

    let first = manager.register_worker().await.unwrap();
    let second = manager.register_worker().await.unwrap();
    assert_eq!(first, second);
    assert_eq!(browser.register_calls(), 1);
    assert_eq!(manager.registration(), Some(first.clone()));
    assert!(first.controls("/todays-leads"));
}

#[tokio::test]
async fn test_failed_registration_is_retried_later() {
    let browser = SimulatedBrowser::new();
    browser.set_fail_registration(true);
    let manager = worker_manager(&browser);

    assert!(manager.register_worker().await.is_none());
    assert!(manager.registration().is_none());

    browser.set_fail_registration(false);
    assert!(manager.register_worker().await.is_some());
    assert_eq!(browser.register_calls(), 2);
}

#[tokio::test]
async fn test_missing_container_skips_registration() {
    let browser = SimulatedBrowser::new();
    browser.set_worker_available(false);
    let manager = worker_manager(&browser);

    assert!(manager.register_worker().await.is_none());
    assert_eq!(browser.register_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_readiness_is_bounded() {
    let browser = SimulatedBrowser::new();
    browser.set_worker_ready(false);
    let manager = worker_manager(&browser);
    let handle = manager.register_worker().await.unwrap();

    assert!(!manager.wait_ready(&handle).await);
    assert!(manager.ensure_ready().await.is_none());

    browser.set_worker_ready(true);
    assert!(manager.wait_ready(&handle).await);
}

#[tokio::test]
async fn test_skip_waiting_requires_a_worker() {
    let browser = SimulatedBrowser::new();
    let manager = worker_manager(&browser);

    use kodegen_push_notify::WorkerContainer as _;
    assert_err!(browser.post_to_worker(serde_json::json!({ "type": "SKIP_WAITING" })));
    assert!(!manager.request_skip_waiting());

    manager.register_worker().await;
    assert!(manager.request_skip_waiting());
    assert_ok!(browser.post_to_worker(serde_json::json!({ "type": "SKIP_WAITING" })));
    assert_eq!(browser.worker_inbox().len(), 2);
}
