//! Per-user push delivery with token pruning.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::{NotificationPayload, Notifier, PushError, PushGateway, PushMessage};
use crate::store::{DocRef, DocumentStore, FieldUpdate, USERS};
use crate::{AppError, Result};

/// User document field holding device tokens, keyed by token string.
pub const USER_TOKENS_FIELD: &str = "fcm_tokens";

/// Result of delivering one notification to one user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Tokens the gateway accepted.
    pub sent: usize,
    /// Tokens that failed and were removed from the user.
    pub pruned: Vec<String>,
    /// How many of the pruned tokens failed for a transient reason.
    pub failed: usize,
}

/// Delivers notifications to every device of a user.
pub struct PushDispatcher {
    store: Arc<dyn DocumentStore>,
    gateway: Arc<dyn PushGateway>,
}

impl PushDispatcher {
    /// Create a dispatcher.
    pub fn new(store: Arc<dyn DocumentStore>, gateway: Arc<dyn PushGateway>) -> Self {
        Self { store, gateway }
    }

    /// Send `payload` to every token of `payload.user_id`.
    ///
    /// Every token whose send fails is dropped, whatever the failure, and the
    /// remaining set is written back to the user document, even when it ends
    /// up empty. A failure to write it
    /// back is logged and does not fail the dispatch.
    pub async fn dispatch(&self, payload: &NotificationPayload) -> Result<DispatchReport> {
        payload.validate()?;

        let user_ref = DocRef::new(USERS, payload.user_id.as_str());
        let user = self
            .store
            .get(&user_ref)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user {}", payload.user_id)))?;

        let mut tokens = match user.data.get(USER_TOKENS_FIELD) {
            Some(Value::Object(tokens)) if !tokens.is_empty() => tokens.clone(),
            _ => return Err(AppError::NoDestination(payload.user_id.clone())),
        };

        let message = PushMessage::from(payload);
        let mut report = DispatchReport::default();
        let candidates: Vec<String> = tokens.keys().cloned().collect();

        for token in candidates {
            match self.gateway.send(&token, &message).await {
                Ok(()) => report.sent += 1,
                Err(e) => {
                    match &e {
                        PushError::Rejected(_) => {
                            warn!(user_id = %payload.user_id, token = %token, error = %e, "Dropping rejected token")
                        }
                        PushError::Unavailable(_) => {
                            report.failed += 1;
                            warn!(user_id = %payload.user_id, token = %token, error = %e, "Dropping token after failed send")
                        }
                    }
                    tokens.remove(&token);
                    report.pruned.push(token);
                }
            }
        }

        let remaining = tokens.len();
        if let Err(e) = self
            .store
            .update(&user_ref, &[FieldUpdate::set(USER_TOKENS_FIELD, Value::Object(tokens))])
            .await
        {
            error!(user_id = %payload.user_id, error = %e, "Failed to save fcm_tokens back to user");
        } else {
            debug!(user_id = %payload.user_id, remaining, "Saved token set");
        }

        info!(
            user_id = %payload.user_id,
            sent = report.sent,
            pruned = report.pruned.len(),
            failed = report.failed,
            "Notification dispatched"
        );
        Ok(report)
    }
}

#[async_trait]
impl Notifier for PushDispatcher {
    async fn notify(&self, payload: NotificationPayload) -> Result<DispatchReport> {
        self.dispatch(&payload).await
    }
}
