//! Test helpers for integration tests.
//!
//! Provides recording push collaborators and a harness that wires the event
//! engine over a chosen document store.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use balifeed::events::{EventDispatcher, Outcome, ENTRIES, RESPONSES};
use balifeed::push::{
    DispatchReport, NotificationPayload, Notifier, PushError, PushGateway, PushMessage,
};
use balifeed::store::{DocRef, Document, DocumentStore, Fields, MemoryStore, SqliteStore};
use balifeed::{Config, Database};

/// Push gateway that records every send and answers from a fixed table.
#[derive(Default)]
pub struct RecordingGateway {
    answers: HashMap<String, PushError>,
    sent: Mutex<Vec<(String, PushMessage)>>,
}

impl RecordingGateway {
    /// Make sends to `token` fail with `error`.
    pub fn failing(mut self, token: &str, error: PushError) -> Self {
        self.answers.insert(token.to_string(), error);
        self
    }

    /// Tokens sent to, in order.
    pub fn tokens(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(token, _)| token.clone())
            .collect()
    }

    /// Messages sent, in order.
    pub fn messages(&self) -> Vec<PushMessage> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, message)| message.clone())
            .collect()
    }
}

#[async_trait]
impl PushGateway for RecordingGateway {
    async fn send(&self, token: &str, message: &PushMessage) -> Result<(), PushError> {
        self.sent
            .lock()
            .unwrap()
            .push((token.to_string(), message.clone()));
        match self.answers.get(token) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

/// Notifier that records payloads instead of delivering them.
#[derive(Default)]
pub struct RecordingNotifier {
    payloads: Mutex<Vec<NotificationPayload>>,
}

impl RecordingNotifier {
    /// Recorded payloads, in order.
    pub fn payloads(&self) -> Vec<NotificationPayload> {
        self.payloads.lock().unwrap().clone()
    }

    /// Recipients of the recorded payloads, sorted.
    pub fn recipients(&self) -> Vec<String> {
        let mut users: Vec<String> = self.payloads().into_iter().map(|p| p.user_id).collect();
        users.sort();
        users
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, payload: NotificationPayload) -> balifeed::Result<DispatchReport> {
        self.payloads.lock().unwrap().push(payload);
        Ok(DispatchReport {
            sent: 1,
            ..DispatchReport::default()
        })
    }
}

/// Convert a JSON object into document fields.
pub fn fields(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {}", other),
    }
}

/// Event engine wired over a store with a recording notifier.
pub struct Harness {
    pub store: Arc<dyn DocumentStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub dispatcher: EventDispatcher,
}

impl Harness {
    /// Wire the engine over `store` with the default configuration.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        let notifier = Arc::new(RecordingNotifier::default());
        let dispatcher = EventDispatcher::new(store.clone(), notifier.clone(), &Config::default());
        Self {
            store,
            notifier,
            dispatcher,
        }
    }

    /// Harness over an in-memory store.
    pub fn memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Harness over an in-memory SQLite database.
    pub async fn sqlite() -> Self {
        let db = Database::open_in_memory()
            .await
            .expect("Failed to create test database");
        Self::new(Arc::new(SqliteStore::new(Arc::new(db))))
    }

    /// Create or overwrite a document.
    pub async fn seed(&self, collection: &str, id: &str, value: Value) {
        self.store
            .set(&DocRef::new(collection, id), fields(value))
            .await
            .expect("Failed to seed document");
    }

    /// Fetch a document.
    pub async fn doc(&self, collection: &str, id: &str) -> Option<Document> {
        self.store
            .get(&DocRef::new(collection, id))
            .await
            .expect("Failed to read document")
    }

    /// Read an integer field, treating a missing field as zero.
    pub async fn counter(&self, collection: &str, id: &str, field: &str) -> i64 {
        self.doc(collection, id)
            .await
            .and_then(|doc| doc.get_i64(field))
            .unwrap_or(0)
    }

    /// Deliver a response event.
    pub async fn response_event(&self, event: Value) -> Outcome {
        self.dispatcher
            .dispatch(Some(RESPONSES), event.to_string().as_bytes())
            .await
    }

    /// Deliver an entry event.
    pub async fn entry_event(&self, event: Value) -> Outcome {
        self.dispatcher
            .dispatch(Some(ENTRIES), event.to_string().as_bytes())
            .await
    }
}
