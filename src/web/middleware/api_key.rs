//! Shared-key authentication for the Pub/Sub push endpoints.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Query, State},
    http::Request,
    middleware::Next,
    response::Response,
};

use crate::web::error::ApiError;

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Query parameter carrying the API key (push subscriptions cannot set headers).
const API_KEY_PARAM: &str = "key";

/// Expected API key.
#[derive(Debug, Clone)]
pub struct ApiKeyState {
    key: String,
}

impl ApiKeyState {
    /// Create the state for `key`.
    pub fn new(key: impl Into<String>) -> Arc<Self> {
        Arc::new(Self { key: key.into() })
    }

    fn matches(&self, candidate: &str) -> bool {
        !self.key.is_empty() && candidate == self.key
    }
}

/// Reject requests that carry neither a matching `X-API-Key` header nor a
/// matching `key` query parameter.
pub async fn require_api_key(
    State(state): State<Arc<ApiKeyState>>,
    Query(params): Query<HashMap<String, String>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let header = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());
    let authorized = header
        .or_else(|| params.get(API_KEY_PARAM).map(String::as_str))
        .map(|key| state.matches(key));

    match authorized {
        Some(true) => Ok(next.run(request).await),
        Some(false) => {
            tracing::warn!(path = %request.uri().path(), "Rejected request with invalid API key");
            Err(ApiError::unauthorized("Invalid API key"))
        }
        None => Err(ApiError::unauthorized("Missing API key")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches() {
        let state = ApiKeyState::new("s3cret");
        assert!(state.matches("s3cret"));
        assert!(!state.matches("S3CRET"));
        assert!(!state.matches(""));
    }

    #[test]
    fn test_empty_key_never_matches() {
        let state = ApiKeyState::new("");
        assert!(!state.matches(""));
    }
}
