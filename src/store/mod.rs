//! Document store abstraction for BaliFeed.
//!
//! The change-event engine only talks to the store through the
//! [`DocumentStore`] trait, so the same code runs against the SQLite-backed
//! [`SqliteStore`] in production and the [`MemoryStore`] in tests.
//!
//! # Write model
//!
//! - Single-document [`DocumentStore::update`] calls apply a list of
//!   [`FieldUpdate`]s atomically. [`FieldOp::Increment`] is evaluated by the
//!   store itself, never read-modify-written by the caller.
//! - [`WriteBatch`] groups writes that must land together.
//! - [`Transaction`] adds optimistic read preconditions on top of a batch:
//!   every document read through [`Transaction::get`] must be unchanged at
//!   commit time or the commit fails with [`StoreError::Conflict`].
//!   [`run_transaction`] re-runs the transaction body on conflict.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use std::fmt;
use std::future::Future;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Collection holding category documents.
pub const CATEGORIES: &str = "categories";

/// Collection holding comments and reactions.
pub const ENTRY_RESPONSES: &str = "entry_responses";

/// Collection holding user documents.
pub const USERS: &str = "users";

/// Maximum number of attempts for a conflicting transaction.
pub const MAX_TRANSACTION_ATTEMPTS: usize = 5;

/// Path of the subscriber sub-collection of a category.
pub fn subscribers_collection(category: &str) -> String {
    format!("{}/{}/subscribers", CATEGORIES, category)
}

/// Field map of a document.
pub type Fields = serde_json::Map<String, Value>;

/// Errors reported by document store backends.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The document targeted by an update does not exist.
    #[error("document {0} not found")]
    NotFound(String),

    /// A document read inside a transaction changed before commit.
    #[error("transaction conflict on {0}")]
    Conflict(String),

    /// The backend could not be reached or failed mid-operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Stored data could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),
}

impl StoreError {
    /// Whether the same operation may succeed if tried again.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Conflict(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Codec(e.to_string())
    }
}

/// Reference to a document: collection path plus document ID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocRef {
    collection: String,
    id: String,
}

impl DocRef {
    /// Create a reference to `collection/id`.
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// Collection path.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Document ID within the collection.
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for DocRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// A stored document snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Where the document lives.
    pub reference: DocRef,
    /// Document fields.
    pub data: Fields,
    /// Store-assigned version, changes on every write.
    pub version: u64,
}

impl Document {
    /// Document ID.
    pub fn id(&self) -> &str {
        self.reference.id()
    }

    /// Read a string field.
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.data.get(field).and_then(Value::as_str)
    }

    /// Read an integer field.
    pub fn get_i64(&self, field: &str) -> Option<i64> {
        self.data.get(field).and_then(Value::as_i64)
    }

    /// Decode the whole document into a typed struct.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        Ok(serde_json::from_value(Value::Object(self.data.clone()))?)
    }
}

/// Operation applied to a single field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOp {
    /// Add to the numeric value, treating a missing field as zero.
    Increment(i64),
    /// Replace the value.
    Set(Value),
}

/// A field path paired with the operation to apply to it.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldUpdate {
    /// Top-level field name.
    pub field: String,
    /// Operation to apply.
    pub op: FieldOp,
}

impl FieldUpdate {
    /// Atomic increment (use a negative value to decrement).
    pub fn increment(field: impl Into<String>, by: i64) -> Self {
        Self {
            field: field.into(),
            op: FieldOp::Increment(by),
        }
    }

    /// Overwrite a field.
    pub fn set(field: impl Into<String>, value: Value) -> Self {
        Self {
            field: field.into(),
            op: FieldOp::Set(value),
        }
    }
}

/// Apply field updates to an in-memory field map.
pub(crate) fn apply_updates(data: &mut Fields, updates: &[FieldUpdate]) {
    for update in updates {
        match &update.op {
            FieldOp::Increment(by) => {
                // Integers stay integers; a float counter stays a float.
                let current = data.get(&update.field);
                let next = match (current.and_then(Value::as_i64), current.and_then(Value::as_f64)) {
                    (Some(n), _) => Value::from(n + by),
                    (None, Some(f)) => Value::from(f + *by as f64),
                    (None, None) => Value::from(*by),
                };
                data.insert(update.field.clone(), next);
            }
            FieldOp::Set(value) => {
                data.insert(update.field.clone(), value.clone());
            }
        }
    }
}

/// A single staged write.
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    /// Create or overwrite a document.
    Set { doc: DocRef, data: Fields },
    /// Update fields of an existing document.
    Update {
        doc: DocRef,
        updates: Vec<FieldUpdate>,
    },
    /// Delete a document (no-op if absent).
    Delete { doc: DocRef },
}

impl Write {
    /// Document targeted by this write.
    pub fn doc(&self) -> &DocRef {
        match self {
            Write::Set { doc, .. } | Write::Update { doc, .. } | Write::Delete { doc } => doc,
        }
    }
}

/// Group of writes committed atomically.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    writes: Vec<Write>,
}

impl WriteBatch {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a document overwrite.
    pub fn set(&mut self, doc: DocRef, data: Fields) -> &mut Self {
        self.writes.push(Write::Set { doc, data });
        self
    }

    /// Stage a field update.
    pub fn update(&mut self, doc: DocRef, updates: Vec<FieldUpdate>) -> &mut Self {
        self.writes.push(Write::Update { doc, updates });
        self
    }

    /// Stage a delete.
    pub fn delete(&mut self, doc: DocRef) -> &mut Self {
        self.writes.push(Write::Delete { doc });
        self
    }

    /// Number of staged writes.
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    /// Check if nothing is staged.
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Staged writes in order.
    pub fn writes(&self) -> &[Write] {
        &self.writes
    }
}

/// Version observed for a document read inside a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadGuard {
    /// Document that was read.
    pub doc: DocRef,
    /// Version seen, or `None` if the document did not exist.
    pub version: Option<u64>,
}

/// Write set with optimistic read preconditions.
#[derive(Debug, Clone, Default)]
pub struct Transaction {
    reads: Vec<ReadGuard>,
    batch: WriteBatch,
}

impl Transaction {
    /// Create an empty transaction.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a document and record its version as a commit precondition.
    pub async fn get<S>(&mut self, store: &S, doc: &DocRef) -> Result<Option<Document>, StoreError>
    where
        S: DocumentStore + ?Sized,
    {
        let found = store.get(doc).await?;
        self.reads.push(ReadGuard {
            doc: doc.clone(),
            version: found.as_ref().map(|d| d.version),
        });
        Ok(found)
    }

    /// Stage a document overwrite.
    pub fn set(&mut self, doc: DocRef, data: Fields) -> &mut Self {
        self.batch.set(doc, data);
        self
    }

    /// Stage a field update.
    pub fn update(&mut self, doc: DocRef, updates: Vec<FieldUpdate>) -> &mut Self {
        self.batch.update(doc, updates);
        self
    }

    /// Stage a delete.
    pub fn delete(&mut self, doc: DocRef) -> &mut Self {
        self.batch.delete(doc);
        self
    }

    /// Recorded read preconditions.
    pub fn reads(&self) -> &[ReadGuard] {
        &self.reads
    }

    /// Staged writes in order.
    pub fn writes(&self) -> &[Write] {
        self.batch.writes()
    }
}

impl From<WriteBatch> for Transaction {
    fn from(batch: WriteBatch) -> Self {
        Self {
            reads: Vec::new(),
            batch,
        }
    }
}

/// Collection/document oriented store consumed by the event engine.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch a document by reference.
    async fn get(&self, doc: &DocRef) -> Result<Option<Document>, StoreError>;

    /// Create or overwrite a document.
    async fn set(&self, doc: &DocRef, data: Fields) -> Result<(), StoreError>;

    /// Apply field updates to an existing document atomically.
    ///
    /// Fails with [`StoreError::NotFound`] if the document does not exist.
    async fn update(&self, doc: &DocRef, updates: &[FieldUpdate]) -> Result<(), StoreError>;

    /// Delete a document. Deleting a missing document succeeds.
    async fn delete(&self, doc: &DocRef) -> Result<(), StoreError>;

    /// All documents of a collection, ordered by ID.
    async fn list(&self, collection: &str) -> Result<Vec<Document>, StoreError>;

    /// Documents of a collection whose `field` equals `value`, ordered by ID.
    async fn query_eq(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Document>, StoreError>;

    /// Commit a transaction: all writes apply or none do.
    async fn commit(&self, tx: Transaction) -> Result<(), StoreError>;

    /// Commit a batch atomically.
    async fn commit_batch(&self, batch: WriteBatch) -> Result<(), StoreError> {
        self.commit(Transaction::from(batch)).await
    }
}

/// Run a transaction body, retrying it when the commit conflicts.
///
/// `body` receives a fresh [`Transaction`] on every attempt, performs its
/// reads through it, stages writes and hands it back together with a value
/// that is returned once the commit succeeds.
pub async fn run_transaction<S, F, Fut, T>(store: &S, mut body: F) -> Result<T, StoreError>
where
    S: DocumentStore + ?Sized,
    F: FnMut(Transaction) -> Fut,
    Fut: Future<Output = Result<(Transaction, T), StoreError>>,
{
    let mut attempt = 1;
    loop {
        let (tx, value) = body(Transaction::new()).await?;
        match store.commit(tx).await {
            Ok(()) => return Ok(value),
            Err(StoreError::Conflict(doc)) if attempt < MAX_TRANSACTION_ATTEMPTS => {
                debug!(attempt, doc = %doc, "Transaction conflict, retrying");
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
