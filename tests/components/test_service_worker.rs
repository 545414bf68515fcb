//! Tests for components/service_worker.rs

use kodegen_push_notify::components::payload::{DEFAULT_ICON, DEFAULT_TITLE};
use kodegen_push_notify::{
    NotificationId, NotificationSpec, PayloadData, PushConfig, ServiceWorkerRuntime, ShownNotification,
    SimulatedBrowser, WorkerBindings, WorkerEvent, worker_runtime,
};
use serde_json::json;

use crate::common::setup_tracing;

fn runtime(browser: &SimulatedBrowser) -> ServiceWorkerRuntime {
    setup_tracing();
    worker_runtime(&PushConfig::default(), WorkerBindings::simulated(browser))
}

fn shown(data: PayloadData) -> ShownNotification {
    let mut spec = NotificationSpec::fallback();
    spec.data = data;
    ShownNotification {
        id: NotificationId::generate(),
        spec,
    }
}

#[tokio::test]
async fn test_install_activates_immediately() {
    let browser = SimulatedBrowser::new();
    let runtime = runtime(&browser);
    assert_eq!(runtime.cache_version(), "gaadimech-crm-v1");
    assert_eq!(runtime.default_url(), "/todays-leads");

    runtime.dispatch(WorkerEvent::Install).await.unwrap();
    assert_eq!(browser.skip_waiting_count(), 1);
}

#[tokio::test]
async fn test_activate_prunes_stale_caches_and_claims_clients() {
    let browser = SimulatedBrowser::new();
    browser.add_cache("gaadimech-crm-v0");
    browser.add_cache("gaadimech-crm-v1");
    browser.add_cache("images-2023");
    let page = browser.open_client("http://localhost:3000/dashboard", false);

    runtime(&browser).dispatch(WorkerEvent::Activate).await.unwrap();

    assert_eq!(browser.cache_names(), vec!["gaadimech-crm-v1".to_string()]);
    assert_eq!(browser.claim_count(), 1);
    let client = browser.clients().into_iter().find(|c| c.id == page).unwrap();
    assert!(client.controlled);
}

#[tokio::test]
async fn test_push_displays_payload() {
    let browser = SimulatedBrowser::new();
    let data = serde_json::to_vec(&json!({
        "notification": { "title": "Follow-up due", "body": "Call Priya at 4pm" },
        "data": { "url": "/followups" }
    }))
    .unwrap();

    runtime(&browser)
        .dispatch(WorkerEvent::Push { data: Some(data) })
        .await
        .unwrap();

    let shown = browser.shown_notifications();
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0].1.title, "Follow-up due");
    assert_eq!(shown[0].1.data.url.as_deref(), Some("/followups"));
}

#[tokio::test]
async fn test_unreadable_push_shows_default_notification() {
    let browser = SimulatedBrowser::new();
    let runtime = runtime(&browser);

    runtime
        .dispatch(WorkerEvent::Push {
            data: Some(b"\xff not json".to_vec()),
        })
        .await
        .unwrap();
    runtime.dispatch(WorkerEvent::Push { data: None }).await.unwrap();

    let shown = browser.shown_notifications();
    assert_eq!(shown.len(), 2);
    for (_, spec) in shown {
        assert_eq!(spec.title, DEFAULT_TITLE);
        assert_eq!(spec.icon, DEFAULT_ICON);
    }
}

#[tokio::test]
async fn test_click_focuses_existing_window() {
    let browser = SimulatedBrowser::new();
    let existing = browser.open_client("http://localhost:3000/todays-leads?page=2", false);
    let notification = shown(PayloadData::default());

    runtime(&browser)
        .dispatch(WorkerEvent::NotificationClick {
            notification: notification.clone(),
            action: Some("open".to_string()),
        })
        .await
        .unwrap();

    assert_eq!(browser.focused_clients(), vec![existing]);
    assert!(browser.opened_windows().is_empty(), "no duplicate window");
    assert_eq!(browser.closed_notifications(), vec![notification.id]);
}

#[tokio::test]
async fn test_click_opens_window_when_none_matches() {
    let browser = SimulatedBrowser::new();
    browser.open_client("http://localhost:3000/dashboard", true);
    let notification = shown(PayloadData::with_url("/leads/77"));

    let runtime = runtime(&browser);
    runtime
        .dispatch(WorkerEvent::NotificationClick {
            notification: notification.clone(),
            action: None,
        })
        .await
        .unwrap();
    assert_eq!(browser.opened_windows(), vec!["/leads/77".to_string()]);

    // The new window now shows the target, so a second click focuses it
    runtime
        .dispatch(WorkerEvent::NotificationClick {
            notification,
            action: None,
        })
        .await
        .unwrap();
    assert_eq!(browser.opened_windows().len(), 1);
    assert_eq!(browser.focused_clients().len(), 1);
}

#[tokio::test]
async fn test_click_ignores_windows_on_similar_paths() {
    let browser = SimulatedBrowser::new();
    browser.open_client("http://localhost:3000/todays-leads-archive", true);
    browser.open_client("http://localhost:3000/", true);
    let notification = shown(PayloadData::default());

    runtime(&browser)
        .dispatch(WorkerEvent::NotificationClick {
            notification,
            action: None,
        })
        .await
        .unwrap();

    assert!(browser.focused_clients().is_empty());
    assert_eq!(browser.opened_windows(), vec!["/todays-leads".to_string()]);
}

#[tokio::test]
async fn test_close_action_only_dismisses() {
    let browser = SimulatedBrowser::new();
    let notification = shown(PayloadData::with_url("/leads/5"));

    runtime(&browser)
        .dispatch(WorkerEvent::NotificationClick {
            notification: notification.clone(),
            action: Some("close".to_string()),
        })
        .await
        .unwrap();

    assert_eq!(browser.closed_notifications(), vec![notification.id]);
    assert!(browser.opened_windows().is_empty());
    assert!(browser.focused_clients().is_empty());
}

#[tokio::test]
async fn test_token_rotation_reaches_controlled_pages_only() {
    let browser = SimulatedBrowser::new();
    let controlled = browser.open_client("http://localhost:3000/", true);
    browser.open_client("http://localhost:3000/other", false);

    use kodegen_push_notify::WorkerContainer as _;
    let mut page = browser.subscribe_messages();

    let token = browser.rotate_token();
    runtime(&browser)
        .dispatch(WorkerEvent::TokenRotated(token.clone()))
        .await
        .unwrap();

    let message = page.recv().await.unwrap();
    assert_eq!(message, json!({ "type": "FCM_TOKEN_REFRESH", "token": token.as_str() }));
    assert!(page.try_recv().is_err(), "only one controlled page");
    assert!(browser.clients().iter().any(|c| c.id == controlled));
}

#[tokio::test]
async fn test_unknown_page_message_is_ignored() {
    let browser = SimulatedBrowser::new();
    runtime(&browser)
        .dispatch(WorkerEvent::Message(json!({ "type": "CLAIM_EVERYTHING" })))
        .await
        .unwrap();
    assert_eq!(browser.skip_waiting_count(), 0);
}
