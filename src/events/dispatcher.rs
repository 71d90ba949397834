//! Routing of change events to the engine components.

use std::fmt;
use std::sync::Arc;

use tracing::{error, info, warn};

use super::category::CategoryResolver;
use super::counter::{CounterAggregator, CounterChange};
use super::fanout::SubscriberFanout;
use super::types::{ChangeEvent, EntrySnapshot, ResponseSnapshot, Transition};
use crate::config::Config;
use crate::push::Notifier;
use crate::store::DocumentStore;
use crate::AppError;

/// `type` attribute of entry events.
pub const ENTRIES: &str = "entries";

/// `type` attribute of response events.
pub const RESPONSES: &str = "responses";

/// Result of handling one event.
///
/// The HTTP boundary acknowledges every outcome; the distinction only
/// drives logging.
#[derive(Debug)]
pub enum Outcome {
    /// The event changed state or sent notifications.
    Handled(String),
    /// The event needed no work.
    Skipped(String),
    /// Handling failed for a reason that redelivery could fix.
    Retryable(AppError),
    /// Handling failed and redelivery would fail the same way.
    Terminal(AppError),
}

impl Outcome {
    fn from_error(e: AppError) -> Self {
        if e.is_retryable() {
            Outcome::Retryable(e)
        } else {
            Outcome::Terminal(e)
        }
    }

    /// Check if the event was processed without error.
    pub fn is_ok(&self) -> bool {
        matches!(self, Outcome::Handled(_) | Outcome::Skipped(_))
    }

    /// Log the outcome for the message `message_id`.
    pub fn log(&self, message_id: &str) {
        match self {
            Outcome::Handled(detail) => info!(message_id, detail = %detail, "Event handled"),
            Outcome::Skipped(reason) => info!(message_id, reason = %reason, "Event skipped"),
            Outcome::Retryable(e) => {
                error!(message_id, error = %e, "Event failed (transient), acknowledged anyway")
            }
            Outcome::Terminal(e) => warn!(message_id, error = %e, "Event dropped"),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Handled(detail) => write!(f, "handled: {}", detail),
            Outcome::Skipped(reason) => write!(f, "skipped: {}", reason),
            Outcome::Retryable(e) => write!(f, "retryable: {}", e),
            Outcome::Terminal(e) => write!(f, "terminal: {}", e),
        }
    }
}

/// Routes change events by their `type` attribute.
pub struct EventDispatcher {
    fanout: SubscriberFanout,
    counters: CounterAggregator,
}

impl EventDispatcher {
    /// Wire the engine components over a store and a notifier.
    pub fn new(store: Arc<dyn DocumentStore>, notifier: Arc<dyn Notifier>, config: &Config) -> Self {
        let resolver = Arc::new(CategoryResolver::new(&config.categories));
        Self {
            fanout: SubscriberFanout::new(
                store.clone(),
                resolver.clone(),
                notifier.clone(),
                config.push.click_action.clone(),
                config.push.fanout_concurrency,
            ),
            counters: CounterAggregator::new(
                store,
                resolver,
                notifier,
                config.push.click_action.clone(),
                config.push.reply_title.clone(),
            ),
        }
    }

    /// Handle one event payload.
    ///
    /// Events without a type are terminal, unknown types are skipped.
    pub async fn dispatch(&self, event_type: Option<&str>, payload: &[u8]) -> Outcome {
        match event_type {
            Some(ENTRIES) => self.entries(payload).await,
            Some(RESPONSES) => self.responses(payload).await,
            Some(other) => Outcome::Skipped(format!("unknown event type {:?}", other)),
            None => Outcome::Terminal(AppError::Validation(
                "type is missing from message attributes".to_string(),
            )),
        }
    }

    async fn entries(&self, payload: &[u8]) -> Outcome {
        let event: ChangeEvent<EntrySnapshot> = match serde_json::from_slice(payload) {
            Ok(event) => event,
            Err(e) => return Outcome::Terminal(e.into()),
        };

        // Counter updates rewrite entries too; only creation notifies.
        let Some(Transition::Created(entry)) = event.transition() else {
            return Outcome::Skipped(format!("entry {} not created", event.id));
        };

        match self.fanout.notify_subscribers(entry).await {
            Ok(Some(report)) => Outcome::Handled(format!(
                "entry {} fanned out to {} of {} subscribers in category {}",
                entry.id, report.notified, report.subscribers, report.category
            )),
            Ok(None) => Outcome::Skipped(format!("no category for entry {}", entry.id)),
            Err(e) => Outcome::from_error(e),
        }
    }

    async fn responses(&self, payload: &[u8]) -> Outcome {
        let event: ChangeEvent<ResponseSnapshot> = match serde_json::from_slice(payload) {
            Ok(event) => event,
            Err(e) => return Outcome::Terminal(e.into()),
        };

        match self.counters.apply(&event).await {
            Ok(CounterChange::Unchanged) => {
                Outcome::Skipped(format!("response {} changed no counters", event.id))
            }
            Ok(change) => Outcome::Handled(format!("response {}: {:?}", event.id, change)),
            Err(e) => Outcome::from_error(e),
        }
    }
}
