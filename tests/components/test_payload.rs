//! Tests for components/payload.rs and components/messages.rs

use kodegen_push_notify::components::payload::{DEFAULT_BADGE, DEFAULT_BODY, DEFAULT_TITLE};
use kodegen_push_notify::components::{
    ACTION_CLOSE, ACTION_OPEN, DeliveryToken, NotificationSpec, PushPayload, WorkerMessage,
};
use serde_json::json;

#[test]
fn test_provider_payload_renders_lead_notification() {
    let raw = br#"{
        "notification": { "title": "New Lead Assigned", "body": "Amit, Swift Dzire, Sector 21" },
        "data": { "url": "/leads/981", "tag": "lead-981", "requireInteraction": "true" }
    }"#;
    let spec = NotificationSpec::from_payload(&PushPayload::from_slice(raw).unwrap());

    assert_eq!(spec.title, "New Lead Assigned");
    assert_eq!(spec.body, "Amit, Swift Dzire, Sector 21");
    assert_eq!(spec.badge, DEFAULT_BADGE);
    assert_eq!(spec.tag, "lead-981");
    assert!(spec.require_interaction);
    assert_eq!(spec.target_url("/todays-leads"), "/leads/981");
    let actions: Vec<_> = spec.actions.iter().map(|a| a.action.as_str()).collect();
    assert_eq!(actions, vec![ACTION_OPEN, ACTION_CLOSE]);
}

#[test]
fn test_require_interaction_string_false_is_false() {
    let payload = PushPayload::from_value(json!({ "data": { "requireInteraction": "false" } })).unwrap();
    assert!(!payload.require_interaction());
}

#[test]
fn test_blank_fields_fall_back_to_defaults() {
    let payload = PushPayload::from_value(json!({
        "notification": { "title": "", "body": "  " }
    }))
    .unwrap();
    assert_eq!(payload.title(), DEFAULT_TITLE);
    assert_eq!(payload.body(), DEFAULT_BODY);
}

#[test]
fn test_spec_serializes_camel_case() {
    let value = serde_json::to_value(NotificationSpec::fallback()).unwrap();
    assert_eq!(value["requireInteraction"], json!(false));
    assert_eq!(value["vibrate"], json!([200, 100, 200]));
}

#[test]
fn test_worker_message_wire_shapes() {
    let refresh = WorkerMessage::TokenRefresh {
        token: DeliveryToken::new("T2"),
    };
    assert_eq!(refresh.to_value(), json!({ "type": "FCM_TOKEN_REFRESH", "token": "T2" }));
    assert_eq!(WorkerMessage::SkipWaiting.to_value(), json!({ "type": "SKIP_WAITING" }));

    let extra_fields = json!({ "type": "FCM_TOKEN_REFRESH", "token": "T3", "sentAt": 12 });
    assert_eq!(
        WorkerMessage::from_value(&extra_fields).unwrap(),
        WorkerMessage::TokenRefresh {
            token: DeliveryToken::new("T3")
        }
    );
}
