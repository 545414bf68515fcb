//! Tests for components/mod.rs

use kodegen_push_notify::components::{DeliveryToken, NotificationId, PushError};

#[test]
fn test_notification_id_generation() {
    let id1 = NotificationId::generate();
    let id2 = NotificationId::generate();
    assert_ne!(id1, id2);

    let parsed: NotificationId = id1.to_string().parse().unwrap();
    assert_eq!(id1, parsed);
    assert!("not-a-uuid".parse::<NotificationId>().is_err());
}

#[test]
fn test_delivery_token_serializes_whole_value() {
    let token = DeliveryToken::new("fcm-token-with-a-long-tail");
    let json = serde_json::to_string(&token).unwrap();
    assert_eq!(json, "\"fcm-token-with-a-long-tail\"");

    let back: DeliveryToken = serde_json::from_str(&json).unwrap();
    assert_eq!(back, token);
    assert!(!format!("{back}").contains("long-tail"));
}

#[test]
fn test_blank_token_is_empty() {
    assert!(DeliveryToken::new("").is_empty());
    assert!(DeliveryToken::new("   ").is_empty());
    assert!(!DeliveryToken::new("T1").is_empty());
}

#[test]
fn test_error_display_carries_context() {
    let error = PushError::Registry {
        operation: "push/subscribe".to_string(),
        status: 400,
        message: "fcm_token is required".to_string(),
    };
    let text = error.to_string();
    assert!(text.contains("push/subscribe"));
    assert!(text.contains("400"));
    assert!(text.contains("fcm_token is required"));
    assert!(error.is_transient());
}

#[test]
fn test_json_errors_become_payload_errors() {
    let error: PushError = serde_json::from_str::<serde_json::Value>("{").unwrap_err().into();
    assert!(matches!(error, PushError::Payload { .. }));
}

#[test]
fn test_url_errors_become_config_errors() {
    let error: PushError = url::Url::parse("::").unwrap_err().into();
    assert!(matches!(error, PushError::Config { ref field, .. } if field == "url"));
}
