//! HTTP handlers.

pub mod pubsub;

pub use pubsub::*;

use std::sync::Arc;

use crate::events::EventDispatcher;
use crate::push::Notifier;

/// Shared state of the HTTP handlers.
pub struct AppState {
    /// Change-event engine.
    pub events: Arc<EventDispatcher>,
    /// Delivery of direct push requests.
    pub notifier: Arc<dyn Notifier>,
}

impl AppState {
    /// Create a new application state.
    pub fn new(events: Arc<EventDispatcher>, notifier: Arc<dyn Notifier>) -> Self {
        Self { events, notifier }
    }
}
