//! Firebase Cloud Messaging gateway (HTTP v1 API).

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{PushError, PushGateway, PushMessage};
use crate::config::PushConfig;
use crate::{AppError, Result};

/// User agent string for FCM requests.
const USER_AGENT: &str = "BaliFeed/1.0 (Push)";

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    message: FcmMessage<'a>,
}

#[derive(Debug, Serialize)]
struct FcmMessage<'a> {
    token: &'a str,
    notification: FcmNotification<'a>,
    #[serde(skip_serializing_if = "is_empty_map")]
    data: &'a BTreeMap<String, String>,
    android: AndroidConfig<'a>,
}

fn is_empty_map(map: &&BTreeMap<String, String>) -> bool {
    map.is_empty()
}

#[derive(Debug, Serialize)]
struct FcmNotification<'a> {
    title: &'a str,
    body: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct AndroidConfig<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    collapse_key: Option<&'a str>,
    notification: AndroidNotification<'a>,
}

#[derive(Debug, Serialize)]
struct AndroidNotification<'a> {
    color: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<&'a str>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    error: ErrorBody,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    details: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(rename = "errorCode", default)]
    error_code: Option<String>,
}

/// Push gateway backed by the FCM HTTP v1 `messages:send` endpoint.
pub struct FcmGateway {
    client: Client,
    send_url: String,
    access_token: String,
    android_color: String,
}

impl FcmGateway {
    /// Create a gateway from the push configuration.
    pub fn new(config: &PushConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| AppError::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            send_url: format!(
                "{}/v1/projects/{}/messages:send",
                config.endpoint.trim_end_matches('/'),
                config.project_id
            ),
            access_token: config.access_token.clone(),
            android_color: config.android_color.clone(),
        })
    }

    fn build_request<'a>(&'a self, token: &'a str, message: &'a PushMessage) -> SendRequest<'a> {
        let image = message.image.as_deref();
        SendRequest {
            message: FcmMessage {
                token,
                notification: FcmNotification {
                    title: &message.title,
                    body: &message.body,
                    image,
                },
                data: &message.data,
                android: AndroidConfig {
                    collapse_key: message.collapse_key.as_deref(),
                    notification: AndroidNotification {
                        color: &self.android_color,
                        image,
                    },
                },
            },
        }
    }
}

/// Map a failed FCM response to a [`PushError`].
///
/// Unregistered tokens (404 or `UNREGISTERED`) and malformed tokens
/// (400 `INVALID_ARGUMENT`) are rejections; everything else is treated as a
/// gateway failure.
fn classify_failure(status: StatusCode, body: &str) -> PushError {
    let parsed: ErrorResponse = serde_json::from_str(body).unwrap_or_default();
    let error_code = parsed
        .error
        .details
        .iter()
        .find_map(|d| d.error_code.clone())
        .unwrap_or_default();
    let reason = if parsed.error.message.is_empty() {
        format!("HTTP {}", status)
    } else {
        format!("HTTP {}: {}", status, parsed.error.message)
    };

    let rejected = status == StatusCode::NOT_FOUND
        || error_code == "UNREGISTERED"
        || (status == StatusCode::BAD_REQUEST
            && (error_code == "INVALID_ARGUMENT" || parsed.error.status == "INVALID_ARGUMENT"));

    if rejected {
        PushError::Rejected(reason)
    } else {
        PushError::Unavailable(reason)
    }
}

#[async_trait]
impl PushGateway for FcmGateway {
    async fn send(&self, token: &str, message: &PushMessage) -> std::result::Result<(), PushError> {
        let response = self
            .client
            .post(&self.send_url)
            .bearer_auth(&self.access_token)
            .json(&self.build_request(token, message))
            .send()
            .await
            .map_err(|e| PushError::Unavailable(format!("failed to reach FCM: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            debug!(token = %token, "FCM accepted message");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_failure(status, &body))
    }
}
