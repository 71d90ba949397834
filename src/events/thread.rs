//! Cascade deletion of replies.

use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use super::types::ResponseSnapshot;
use crate::store::{DocumentStore, WriteBatch, ENTRY_RESPONSES};
use crate::{AppError, Result};

/// Deletes the replies of a deleted response, one level per call.
///
/// Deeper levels are removed when the delete events of the cascaded replies
/// come back through the event transport.
pub struct ThreadPruner {
    store: Arc<dyn DocumentStore>,
}

impl ThreadPruner {
    /// Create a pruner.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Delete the replies of `response_id` in a single batch.
    ///
    /// A top-level comment loses every response of its thread; a reply loses
    /// its direct children. Returns the number of deleted documents.
    pub async fn prune(&self, response_id: &str, deleted: &ResponseSnapshot) -> Result<usize> {
        if response_id.is_empty() {
            return Err(AppError::Validation(
                "cannot prune replies of a response without an ID".to_string(),
            ));
        }

        let field = if deleted.thread_id.is_empty() {
            "thread_id"
        } else {
            "parent_id"
        };
        let replies = self
            .store
            .query_eq(ENTRY_RESPONSES, field, &Value::from(response_id))
            .await?;
        if replies.is_empty() {
            return Ok(0);
        }

        let mut batch = WriteBatch::new();
        for reply in &replies {
            batch.delete(reply.reference.clone());
        }
        self.store.commit_batch(batch).await?;

        info!(response_id, field, count = replies.len(), "Deleted replies");
        Ok(replies.len())
    }
}
