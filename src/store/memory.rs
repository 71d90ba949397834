//! In-process document store.
//!
//! Used by tests and local development. Commits are applied to a staged copy
//! of the document map and swapped in only when every write succeeded, which
//! gives the same all-or-nothing behavior as the SQLite backend.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;

use super::{
    apply_updates, DocRef, Document, DocumentStore, FieldUpdate, Fields, StoreError, Transaction,
    Write,
};

#[derive(Debug, Clone)]
struct Stored {
    data: Fields,
    version: u64,
}

#[derive(Debug, Default)]
struct MemoryState {
    docs: BTreeMap<DocRef, Stored>,
    clock: u64,
    failing: HashSet<DocRef>,
}

/// Document store kept entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write to `doc` fail with [`StoreError::Unavailable`].
    ///
    /// The failure is raised while a commit is being applied, after earlier
    /// writes of the same commit were staged.
    pub fn fail_writes_to(&self, doc: DocRef) {
        if let Ok(mut state) = self.state.lock() {
            state.failing.insert(doc);
        }
    }

    /// Remove all injected write failures.
    pub fn clear_failures(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.failing.clear();
        }
    }

    /// Number of documents in a collection.
    pub fn count(&self, collection: &str) -> usize {
        self.state
            .lock()
            .map(|state| {
                state
                    .docs
                    .keys()
                    .filter(|doc| doc.collection() == collection)
                    .count()
            })
            .unwrap_or(0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }

    fn to_document(doc: &DocRef, stored: &Stored) -> Document {
        Document {
            reference: doc.clone(),
            data: stored.data.clone(),
            version: stored.version,
        }
    }

    fn apply(
        docs: &mut BTreeMap<DocRef, Stored>,
        failing: &HashSet<DocRef>,
        write: &Write,
        version: u64,
    ) -> Result<(), StoreError> {
        if failing.contains(write.doc()) {
            return Err(StoreError::Unavailable(format!(
                "injected write failure on {}",
                write.doc()
            )));
        }

        match write {
            Write::Set { doc, data } => {
                docs.insert(
                    doc.clone(),
                    Stored {
                        data: data.clone(),
                        version,
                    },
                );
            }
            Write::Update { doc, updates } => {
                let stored = docs
                    .get_mut(doc)
                    .ok_or_else(|| StoreError::NotFound(doc.to_string()))?;
                apply_updates(&mut stored.data, updates);
                stored.version = version;
            }
            Write::Delete { doc } => {
                docs.remove(doc);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, doc: &DocRef) -> Result<Option<Document>, StoreError> {
        let state = self.lock()?;
        Ok(state.docs.get(doc).map(|stored| Self::to_document(doc, stored)))
    }

    async fn set(&self, doc: &DocRef, data: Fields) -> Result<(), StoreError> {
        let mut tx = Transaction::new();
        tx.set(doc.clone(), data);
        self.commit(tx).await
    }

    async fn update(&self, doc: &DocRef, updates: &[FieldUpdate]) -> Result<(), StoreError> {
        let mut tx = Transaction::new();
        tx.update(doc.clone(), updates.to_vec());
        self.commit(tx).await
    }

    async fn delete(&self, doc: &DocRef) -> Result<(), StoreError> {
        let mut tx = Transaction::new();
        tx.delete(doc.clone());
        self.commit(tx).await
    }

    async fn list(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .docs
            .iter()
            .filter(|(doc, _)| doc.collection() == collection)
            .map(|(doc, stored)| Self::to_document(doc, stored))
            .collect())
    }

    async fn query_eq(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Document>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .docs
            .iter()
            .filter(|(doc, stored)| {
                doc.collection() == collection && stored.data.get(field) == Some(value)
            })
            .map(|(doc, stored)| Self::to_document(doc, stored))
            .collect())
    }

    async fn commit(&self, tx: Transaction) -> Result<(), StoreError> {
        let mut state = self.lock()?;

        for guard in tx.reads() {
            let current = state.docs.get(&guard.doc).map(|stored| stored.version);
            if current != guard.version {
                return Err(StoreError::Conflict(guard.doc.to_string()));
            }
        }

        let version = state.clock + 1;
        let mut staged = state.docs.clone();
        for write in tx.writes() {
            Self::apply(&mut staged, &state.failing, write, version)?;
        }

        state.docs = staged;
        state.clock = version;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::WriteBatch;
    use serde_json::json;

    fn fields(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let store = MemoryStore::new();
        let doc = DocRef::new("users", "u1");
        store
            .set(&doc, fields(json!({"name": "Made"})))
            .await
            .unwrap();

        let found = store.get(&doc).await.unwrap().unwrap();
        assert_eq!(found.get_str("name"), Some("Made"));
        assert!(store.get(&DocRef::new("users", "u2")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_missing_document_fails() {
        let store = MemoryStore::new();
        let result = store
            .update(
                &DocRef::new("entries", "1"),
                &[FieldUpdate::increment("comment_count", 1)],
            )
            .await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_missing_document_is_ok() {
        let store = MemoryStore::new();
        assert!(store.delete(&DocRef::new("entries", "1")).await.is_ok());
    }

    #[tokio::test]
    async fn test_query_eq_filters_by_collection_and_field() {
        let store = MemoryStore::new();
        store
            .set(&DocRef::new("r", "a"), fields(json!({"thread_id": "t"})))
            .await
            .unwrap();
        store
            .set(&DocRef::new("r", "b"), fields(json!({"thread_id": "x"})))
            .await
            .unwrap();
        store
            .set(&DocRef::new("other", "c"), fields(json!({"thread_id": "t"})))
            .await
            .unwrap();

        let found = store.query_eq("r", "thread_id", &json!("t")).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id(), "a");
    }

    #[tokio::test]
    async fn test_failed_commit_leaves_no_partial_writes() {
        let store = MemoryStore::new();
        let entry = DocRef::new("entries", "1");
        let parent = DocRef::new("entry_responses", "p");
        store.set(&entry, fields(json!({"comment_count": 0}))).await.unwrap();
        store.set(&parent, fields(json!({"reply_count": 0}))).await.unwrap();
        store.fail_writes_to(parent.clone());

        let mut batch = WriteBatch::new();
        batch
            .update(entry.clone(), vec![FieldUpdate::increment("comment_count", 1)])
            .update(parent.clone(), vec![FieldUpdate::increment("reply_count", 1)]);
        assert!(store.commit_batch(batch).await.is_err());

        let entry_doc = store.get(&entry).await.unwrap().unwrap();
        assert_eq!(entry_doc.get_i64("comment_count"), Some(0));
    }

    #[tokio::test]
    async fn test_commit_detects_stale_read() {
        let store = MemoryStore::new();
        let doc = DocRef::new("entries", "1");
        store.set(&doc, Fields::new()).await.unwrap();

        let mut tx = Transaction::new();
        tx.get(&store, &doc).await.unwrap();
        store.delete(&doc).await.unwrap();
        tx.update(doc, vec![FieldUpdate::increment("comment_count", 1)]);

        assert!(matches!(store.commit(tx).await, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_count() {
        let store = MemoryStore::new();
        store.set(&DocRef::new("c", "1"), Fields::new()).await.unwrap();
        store.set(&DocRef::new("c", "2"), Fields::new()).await.unwrap();
        assert_eq!(store.count("c"), 2);
        assert_eq!(store.count("d"), 0);
    }
}
