//! Outbound notification payload.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{AppError, Result};

/// `data_type` of a notification about a new entry.
pub const DATA_TYPE_ENTRY: &str = "entry";

/// `data_type` of a notification about a reply to a comment.
pub const DATA_TYPE_RESPONSE: &str = "response";

/// Deep-link data delivered to the client app.
///
/// All values are strings on the wire. `category_id` is the entry's own
/// category, even when subscribers were resolved through another category.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationData {
    pub click_action: String,
    pub data_type: String,
    pub entry_title: String,
    pub entry_id: String,
    pub category_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub category_title: String,
    pub feed_id: String,
    pub published_at: String,
}

impl NotificationData {
    /// Flatten into the string map sent with the push message.
    ///
    /// Empty values are left out.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        [
            ("click_action", &self.click_action),
            ("data_type", &self.data_type),
            ("entry_title", &self.entry_title),
            ("entry_id", &self.entry_id),
            ("category_id", &self.category_id),
            ("category_title", &self.category_title),
            ("feed_id", &self.feed_id),
            ("published_at", &self.published_at),
        ]
        .into_iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
    }
}

/// A notification addressed to one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub user_id: String,
    pub title: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collapse_key: Option<String>,
    #[serde(default)]
    pub data: NotificationData,
}

impl NotificationPayload {
    /// Same payload addressed to another user.
    pub fn for_user(&self, user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..self.clone()
        }
    }

    /// Reject payloads missing a recipient, title or body.
    pub fn validate(&self) -> Result<()> {
        if self.user_id.is_empty() || self.title.is_empty() || self.body.is_empty() {
            return Err(AppError::Validation(
                "invalid message payload: missing user_id, title or body".to_string(),
            ));
        }
        Ok(())
    }
}
