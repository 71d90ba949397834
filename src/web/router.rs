//! Router configuration for the HTTP boundary.

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use super::handlers::{firestore_events, health_check, push_notification, AppState};
use super::middleware::{require_api_key, ApiKeyState};
use crate::config::PubsubConfig;

/// Create the Pub/Sub push router.
///
/// The API key check is skipped in dev mode.
pub fn create_router(app_state: Arc<AppState>, pubsub: &PubsubConfig) -> Router {
    let mut pubsub_routes = Router::new()
        .route("/firestore-events", post(firestore_events))
        .route("/push-notification", post(push_notification));

    if pubsub.is_dev() {
        tracing::warn!("Pub/Sub API key is \"dev\", endpoints are unauthenticated");
    } else {
        pubsub_routes = pubsub_routes.route_layer(middleware::from_fn_with_state(
            ApiKeyState::new(pubsub.api_key.clone()),
            require_api_key,
        ));
    }

    Router::new()
        .nest("/pubsub", pubsub_routes)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(app_state)
}

/// Create a health check router.
pub fn create_health_router() -> Router {
    Router::new().route("/health", get(health_check))
}
