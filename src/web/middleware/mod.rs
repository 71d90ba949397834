//! Middleware for the HTTP boundary.

pub mod api_key;

pub use api_key::{require_api_key, ApiKeyState, API_KEY_HEADER};
