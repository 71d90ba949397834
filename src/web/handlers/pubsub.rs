//! Pub/Sub push endpoints.
//!
//! Both endpoints acknowledge every authenticated request with `200 OK`, so
//! the transport never redelivers. Failures are logged instead.

use axum::{body::Bytes, extract::State, http::StatusCode};
use std::sync::Arc;

use super::AppState;
use crate::events::{PushEnvelope, TYPE_ATTRIBUTE};
use crate::push::NotificationPayload;

fn decode_envelope(body: &[u8]) -> Option<(PushEnvelope, Vec<u8>)> {
    let envelope: PushEnvelope = match serde_json::from_slice(body) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!(error = %e, "Undecodable push envelope, dropping");
            return None;
        }
    };

    match envelope.message.payload() {
        Ok(payload) => Some((envelope, payload)),
        Err(e) => {
            tracing::warn!(message_id = %envelope.message.message_id, error = %e, "Dropping message");
            None
        }
    }
}

/// Handle a document change event.
pub async fn firestore_events(State(state): State<Arc<AppState>>, body: Bytes) -> StatusCode {
    let Some((envelope, payload)) = decode_envelope(&body) else {
        return StatusCode::OK;
    };

    let message = &envelope.message;
    let outcome = state
        .events
        .dispatch(message.attribute(TYPE_ATTRIBUTE), &payload)
        .await;
    outcome.log(&message.message_id);

    StatusCode::OK
}

/// Handle a direct push notification request.
pub async fn push_notification(State(state): State<Arc<AppState>>, body: Bytes) -> StatusCode {
    let Some((envelope, payload)) = decode_envelope(&body) else {
        return StatusCode::OK;
    };
    let message_id = envelope.message.message_id.as_str();

    let notification: NotificationPayload = match serde_json::from_slice(&payload) {
        Ok(notification) => notification,
        Err(e) => {
            tracing::warn!(message_id, error = %e, "Invalid notification payload, dropping");
            return StatusCode::OK;
        }
    };

    let user_id = notification.user_id.clone();
    match state.notifier.notify(notification).await {
        Ok(report) => tracing::info!(
            message_id,
            user_id = %user_id,
            sent = report.sent,
            pruned = report.pruned.len(),
            "Push notification delivered"
        ),
        Err(e) if e.is_retryable() => {
            tracing::error!(message_id, user_id = %user_id, error = %e, "Push notification failed")
        }
        Err(e) => {
            tracing::warn!(message_id, user_id = %user_id, error = %e, "Push notification dropped")
        }
    }

    StatusCode::OK
}

/// Health check handler.
pub async fn health_check() -> &'static str {
    "OK"
}
