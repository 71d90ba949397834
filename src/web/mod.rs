//! HTTP boundary for BaliFeed.
//!
//! Hosts the Pub/Sub push endpoints that feed the change-event engine and
//! the push dispatcher, plus a health check.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod server;

pub use error::ApiError;
pub use handlers::AppState;
pub use router::{create_health_router, create_router};
pub use server::WebServer;
