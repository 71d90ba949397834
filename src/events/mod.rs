//! Change-event engine.
//!
//! Entry events fan out notifications to category subscribers. Response
//! events maintain comment, reply and reaction counters and cascade reply
//! deletion. [`EventDispatcher`] routes an event to the right component and
//! turns the result into an [`Outcome`].
//!
//! Delivery is at least once and events are not deduplicated here: a
//! redelivered response event is counted again.

mod category;
mod counter;
mod dispatcher;
mod envelope;
mod fanout;
mod thread;
mod types;

pub use category::{Category, CategoryResolver};
pub use counter::{CounterAggregator, CounterChange, COMMENT_COUNT, REPLY_COUNT};
pub use dispatcher::{EventDispatcher, Outcome, ENTRIES, RESPONSES};
pub use envelope::{PubsubMessage, PushEnvelope, TYPE_ATTRIBUTE};
pub use fanout::{FanoutReport, SubscriberFanout};
pub use thread::ThreadPruner;
pub use types::{
    Author, ChangeEvent, Enclosure, EntrySnapshot, EntrySummary, ResponseKind, ResponseSnapshot,
    Transition,
};
