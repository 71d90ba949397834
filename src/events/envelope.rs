//! Pub/Sub push subscription envelope.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AppError, Result};

/// Message attribute routing a change event.
pub const TYPE_ATTRIBUTE: &str = "type";

/// Body of a Pub/Sub push request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushEnvelope {
    pub message: PubsubMessage,
    #[serde(default)]
    pub subscription: String,
}

/// A Pub/Sub message.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PubsubMessage {
    /// Base64-encoded payload.
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    #[serde(rename = "messageId", alias = "message_id", default)]
    pub message_id: String,
    #[serde(
        rename = "publishTime",
        alias = "publish_time",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub publish_time: Option<DateTime<Utc>>,
}

impl PushEnvelope {
    /// Wrap a payload the way the push subscription delivers it.
    pub fn wrap(payload: &[u8], attributes: &[(&str, &str)], message_id: &str) -> Self {
        Self {
            message: PubsubMessage {
                data: STANDARD.encode(payload),
                attributes: attributes
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                message_id: message_id.to_string(),
                publish_time: Some(Utc::now()),
            },
            subscription: String::new(),
        }
    }
}

impl PubsubMessage {
    /// Decode the base64 payload.
    pub fn payload(&self) -> Result<Vec<u8>> {
        STANDARD
            .decode(self.data.trim())
            .map_err(|e| AppError::Decode(format!("message data is not base64: {}", e)))
    }

    /// Look up a message attribute.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}
