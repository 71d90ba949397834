//! BaliFeed - change-event aggregation and push notification dispatch.
//!
//! Consumes document change events for entries and responses, keeps the
//! denormalized counters consistent and fans out push notifications to
//! category subscribers.

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod logging;
pub mod push;
pub mod store;
pub mod web;

pub use config::Config;
pub use db::Database;
pub use error::{AppError, Result};
pub use events::{EventDispatcher, Outcome};
pub use push::{FcmGateway, LogOnlyGateway, Notifier, PushDispatcher, PushGateway};
pub use store::{DocumentStore, MemoryStore, SqliteStore};
pub use web::{AppState, WebServer};
