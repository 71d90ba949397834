//! Push dispatch and token pruning against both store backends.

mod common;

use std::sync::Arc;

use serde_json::{json, Value};

use balifeed::push::{NotificationPayload, PushDispatcher, PushError, USER_TOKENS_FIELD};
use balifeed::AppError;
use common::{Harness, RecordingGateway};

fn payload(user_id: &str) -> NotificationPayload {
    serde_json::from_value(json!({
        "user_id": user_id,
        "title": "Kategori 4",
        "body": "Galungan di Ubud",
        "image": "https://img.example/ubud.jpg",
        "data": {
            "click_action": "FLUTTER_NOTIFICATION_CLICK",
            "data_type": "entry",
            "entry_id": "77",
            "entry_title": "Galungan di Ubud",
            "category_id": "4",
            "category_title": "Kategori 4",
            "feed_id": "2",
            "published_at": "1700000000000"
        }
    }))
    .unwrap()
}

fn three_tokens() -> Value {
    json!({
        "name": "Wayan",
        USER_TOKENS_FIELD: { "phone": true, "tablet": true, "old-phone": true }
    })
}

async fn tokens_of(harness: &Harness, user: &str) -> Vec<String> {
    let doc = harness.doc("users", user).await.unwrap();
    let mut tokens: Vec<String> = doc.data[USER_TOKENS_FIELD]
        .as_object()
        .unwrap()
        .keys()
        .cloned()
        .collect();
    tokens.sort();
    tokens
}

fn dispatcher(harness: &Harness, gateway: RecordingGateway) -> (PushDispatcher, Arc<RecordingGateway>) {
    let gateway = Arc::new(gateway);
    (
        PushDispatcher::new(harness.store.clone(), gateway.clone()),
        gateway,
    )
}

async fn assert_rejected_token_is_pruned(harness: Harness) {
    harness.seed("users", "wayan", three_tokens()).await;
    let (dispatcher, gateway) = dispatcher(
        &harness,
        RecordingGateway::default()
            .failing("old-phone", PushError::Rejected("UNREGISTERED".to_string())),
    );

    let report = dispatcher.dispatch(&payload("wayan")).await.unwrap();

    assert_eq!(report.sent, 2);
    assert_eq!(report.pruned, vec!["old-phone".to_string()]);
    assert_eq!(gateway.tokens().len(), 3);
    assert_eq!(tokens_of(&harness, "wayan").await, vec!["phone", "tablet"]);

    // Other fields of the user survive the write-back.
    let doc = harness.doc("users", "wayan").await.unwrap();
    assert_eq!(doc.get_str("name"), Some("Wayan"));
}

#[tokio::test]
async fn test_rejected_token_is_pruned_memory() {
    assert_rejected_token_is_pruned(Harness::memory()).await;
}

#[tokio::test]
async fn test_rejected_token_is_pruned_sqlite() {
    assert_rejected_token_is_pruned(Harness::sqlite().await).await;
}

#[tokio::test]
async fn test_transient_failure_prunes_token() {
    let harness = Harness::sqlite().await;
    harness.seed("users", "wayan", three_tokens()).await;
    let (dispatcher, _) = dispatcher(
        &harness,
        RecordingGateway::default().failing("tablet", PushError::Unavailable("503".to_string())),
    );

    let report = dispatcher.dispatch(&payload("wayan")).await.unwrap();

    assert_eq!(report.sent, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.pruned, vec!["tablet".to_string()]);
    assert_eq!(tokens_of(&harness, "wayan").await, vec!["old-phone", "phone"]);
}

#[tokio::test]
async fn test_every_send_failing_leaves_empty_set() {
    let harness = Harness::sqlite().await;
    harness.seed("users", "wayan", three_tokens()).await;
    let unavailable = PushError::Unavailable("503".to_string());
    let (dispatcher, gateway) = dispatcher(
        &harness,
        RecordingGateway::default()
            .failing("phone", unavailable.clone())
            .failing("tablet", unavailable.clone())
            .failing("old-phone", unavailable),
    );

    let report = dispatcher.dispatch(&payload("wayan")).await.unwrap();

    assert_eq!(report.sent, 0);
    assert_eq!(report.failed, 3);
    assert_eq!(gateway.tokens().len(), 3);
    assert!(tokens_of(&harness, "wayan").await.is_empty());
}

#[tokio::test]
async fn test_all_tokens_rejected_leaves_empty_set() {
    let harness = Harness::memory();
    harness
        .seed("users", "wayan", json!({ USER_TOKENS_FIELD: { "a": true, "b": true } }))
        .await;
    let rejected = PushError::Rejected("INVALID_ARGUMENT".to_string());
    let (dispatcher, _) = dispatcher(
        &harness,
        RecordingGateway::default()
            .failing("a", rejected.clone())
            .failing("b", rejected),
    );

    let report = dispatcher.dispatch(&payload("wayan")).await.unwrap();

    assert_eq!(report.sent, 0);
    assert_eq!(report.pruned.len(), 2);
    assert!(tokens_of(&harness, "wayan").await.is_empty());
}

#[tokio::test]
async fn test_message_carries_payload() {
    let harness = Harness::memory();
    harness
        .seed("users", "wayan", json!({ USER_TOKENS_FIELD: { "phone": true } }))
        .await;
    let (dispatcher, gateway) = dispatcher(&harness, RecordingGateway::default());

    dispatcher.dispatch(&payload("wayan")).await.unwrap();

    let messages = gateway.messages();
    assert_eq!(messages.len(), 1);
    let message = &messages[0];
    assert_eq!(message.title, "Kategori 4");
    assert_eq!(message.body, "Galungan di Ubud");
    assert_eq!(message.image.as_deref(), Some("https://img.example/ubud.jpg"));
    assert_eq!(message.data.get("data_type").map(String::as_str), Some("entry"));
    assert_eq!(message.data.get("entry_id").map(String::as_str), Some("77"));
}

#[tokio::test]
async fn test_user_without_tokens_has_no_destination() {
    let harness = Harness::memory();
    harness.seed("users", "wayan", json!({ "name": "Wayan" })).await;
    let (dispatcher, gateway) = dispatcher(&harness, RecordingGateway::default());

    let err = dispatcher.dispatch(&payload("wayan")).await.unwrap_err();

    assert!(matches!(err, AppError::NoDestination(_)));
    assert!(gateway.tokens().is_empty());
}

#[tokio::test]
async fn test_unknown_user_is_not_found() {
    let harness = Harness::memory();
    let (dispatcher, _) = dispatcher(&harness, RecordingGateway::default());

    let err = dispatcher.dispatch(&payload("nobody")).await.unwrap_err();

    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_incomplete_payload_is_rejected() {
    let harness = Harness::memory();
    let (dispatcher, gateway) = dispatcher(&harness, RecordingGateway::default());
    let mut incomplete = payload("wayan");
    incomplete.title.clear();

    let err = dispatcher.dispatch(&incomplete).await.unwrap_err();

    assert!(matches!(err, AppError::Validation(_)));
    assert!(gateway.tokens().is_empty());
}
