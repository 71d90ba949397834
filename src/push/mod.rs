//! Push notification delivery.
//!
//! - [`PushGateway`] sends one message to one device token.
//! - [`FcmGateway`] implements it over the FCM HTTP v1 API.
//! - [`PushDispatcher`] delivers a [`NotificationPayload`] to every token of
//!   a user and prunes every token whose send failed.
//! - [`Notifier`] is the seam the event engine hands notifications to.

mod dispatch;
mod fcm;
mod payload;

pub use dispatch::{DispatchReport, PushDispatcher, USER_TOKENS_FIELD};
pub use fcm::FcmGateway;
pub use payload::{NotificationData, NotificationPayload, DATA_TYPE_ENTRY, DATA_TYPE_RESPONSE};

use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

/// Per-token delivery failure reported by a gateway.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PushError {
    /// The token is unregistered or invalid and should be dropped.
    #[error("token rejected: {0}")]
    Rejected(String),

    /// The gateway could not be reached or failed temporarily.
    #[error("gateway unavailable: {0}")]
    Unavailable(String),
}

/// A message addressed to a single device.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PushMessage {
    /// Notification title.
    pub title: String,
    /// Notification body.
    pub body: String,
    /// Image shown with the notification.
    pub image: Option<String>,
    /// Android collapse key.
    pub collapse_key: Option<String>,
    /// Data block delivered to the app.
    pub data: BTreeMap<String, String>,
}

impl From<&NotificationPayload> for PushMessage {
    fn from(payload: &NotificationPayload) -> Self {
        Self {
            title: payload.title.clone(),
            body: payload.body.clone(),
            image: payload.image.clone().filter(|s| !s.is_empty()),
            collapse_key: payload.collapse_key.clone().filter(|s| !s.is_empty()),
            data: payload.data.to_map(),
        }
    }
}

/// Sends a message to a device token.
#[async_trait]
pub trait PushGateway: Send + Sync {
    /// Deliver `message` to `token`.
    async fn send(&self, token: &str, message: &PushMessage) -> Result<(), PushError>;
}

/// Gateway used when push delivery is disabled: every send is logged and
/// reported as delivered.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogOnlyGateway;

#[async_trait]
impl PushGateway for LogOnlyGateway {
    async fn send(&self, token: &str, message: &PushMessage) -> Result<(), PushError> {
        info!(token = %token, title = %message.title, "Push disabled, not sending");
        Ok(())
    }
}

/// Receives notifications produced by the event engine.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a notification to `payload.user_id`.
    async fn notify(&self, payload: NotificationPayload) -> crate::Result<DispatchReport>;
}
