//! Counter maintenance for comments and reactions.
//!
//! All counters change through [`FieldUpdate::increment`], which the store
//! applies atomically, so concurrent events on one entry commute.
//!
//! | Event                   | Effect                                            |
//! |-------------------------|---------------------------------------------------|
//! | comment created         | `comment_count + 1`, ancestors `reply_count + 1`  |
//! | comment deleted         | `comment_count - 1`, then prune replies           |
//! | reaction created        | `reaction_<kind>_count + 1`                       |
//! | reaction kind changed   | old kind `- 1`, new kind `+ 1`                    |
//! | reaction deleted        | `reaction_<kind>_count - 1`                       |
//!
//! Deleting a reply does not decrement its ancestors' `reply_count`.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::category::CategoryResolver;
use super::thread::ThreadPruner;
use super::types::{ChangeEvent, ResponseKind, ResponseSnapshot, Transition};
use crate::push::{NotificationData, NotificationPayload, Notifier, DATA_TYPE_RESPONSE};
use crate::store::{
    run_transaction, DocRef, Document, DocumentStore, FieldUpdate, StoreError, ENTRY_RESPONSES,
};
use crate::{AppError, Result};

/// Entry field counting comments.
pub const COMMENT_COUNT: &str = "comment_count";

/// Response field counting replies.
pub const REPLY_COUNT: &str = "reply_count";

/// What a response event changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CounterChange {
    /// A comment was counted; `ancestors` reply counters were bumped.
    CommentAdded { ancestors: usize, notified: bool },
    /// A comment was uncounted and `pruned` replies were deleted.
    CommentRemoved { pruned: usize },
    /// A reaction counter moved by `delta`.
    ReactionCounted { field: String, delta: i64 },
    /// A reaction changed kind.
    ReactionMoved { from: String, to: String },
    /// Nothing to count.
    Unchanged,
}

/// Applies response events to entry and reply counters.
pub struct CounterAggregator {
    store: Arc<dyn DocumentStore>,
    resolver: Arc<CategoryResolver>,
    pruner: ThreadPruner,
    notifier: Arc<dyn Notifier>,
    click_action: String,
    reply_title: String,
}

impl CounterAggregator {
    /// Create an aggregator.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        resolver: Arc<CategoryResolver>,
        notifier: Arc<dyn Notifier>,
        click_action: impl Into<String>,
        reply_title: impl Into<String>,
    ) -> Self {
        Self {
            pruner: ThreadPruner::new(store.clone()),
            store,
            resolver,
            notifier,
            click_action: click_action.into(),
            reply_title: reply_title.into(),
        }
    }

    /// Apply one response event.
    pub async fn apply(&self, event: &ChangeEvent<ResponseSnapshot>) -> Result<CounterChange> {
        let Some(transition) = event.transition() else {
            return Ok(CounterChange::Unchanged);
        };

        match transition {
            Transition::Created(after) => match after.kind {
                ResponseKind::Comment => self.add_comment(after).await,
                ResponseKind::Reaction => self.count_reaction(after, 1).await,
            },
            Transition::Updated { before, after } => match after.kind {
                ResponseKind::Reaction => self.move_reaction(before, after).await,
                ResponseKind::Comment => Ok(CounterChange::Unchanged),
            },
            Transition::Deleted(before) => match before.kind {
                ResponseKind::Comment => self.remove_comment(&event.id, before).await,
                ResponseKind::Reaction => self.count_reaction(before, -1).await,
            },
        }
    }

    fn entry_ref(&self, response: &ResponseSnapshot) -> DocRef {
        self.resolver
            .entry_ref(response.entry_category_id, response.entry_id)
    }

    /// Count a new comment and its ancestors in one transaction, then tell
    /// the parent's author.
    async fn add_comment(&self, response: &ResponseSnapshot) -> Result<CounterChange> {
        let store = self.store.as_ref();
        let entry = self.entry_ref(response);

        let (parent, ancestors) = run_transaction(store, |mut tx| {
            let entry = entry.clone();
            async move {
                tx.update(entry, vec![FieldUpdate::increment(COMMENT_COUNT, 1)]);
                if !response.is_reply() {
                    return Ok::<_, StoreError>((tx, (None, 0)));
                }

                let mut ancestors: usize = 0;
                let parent_ref = DocRef::new(ENTRY_RESPONSES, response.parent_id.as_str());
                let parent = tx.get(store, &parent_ref).await?;
                if parent.is_some() {
                    tx.update(parent_ref, vec![FieldUpdate::increment(REPLY_COUNT, 1)]);
                    ancestors += 1;
                }

                if response.is_nested_reply() {
                    let thread_ref = DocRef::new(ENTRY_RESPONSES, response.thread_id.as_str());
                    if tx.get(store, &thread_ref).await?.is_some() {
                        tx.update(thread_ref, vec![FieldUpdate::increment(REPLY_COUNT, 1)]);
                        ancestors += 1;
                    }
                }
                Ok::<_, StoreError>((tx, (parent, ancestors)))
            }
        })
        .await?;

        debug!(entry = %entry, ancestors, "Comment counted");

        let notified = match parent {
            Some(parent) => self.notify_parent_author(response, &parent).await,
            None => false,
        };
        Ok(CounterChange::CommentAdded {
            ancestors,
            notified,
        })
    }

    async fn remove_comment(
        &self,
        response_id: &str,
        response: &ResponseSnapshot,
    ) -> Result<CounterChange> {
        let entry = self.entry_ref(response);
        self.store
            .update(&entry, &[FieldUpdate::increment(COMMENT_COUNT, -1)])
            .await?;

        let pruned = self.pruner.prune(response_id, response).await?;
        Ok(CounterChange::CommentRemoved { pruned })
    }

    async fn count_reaction(&self, response: &ResponseSnapshot, delta: i64) -> Result<CounterChange> {
        let field = response
            .reaction_field()
            .ok_or_else(|| AppError::Validation("reaction response without reaction".to_string()))?;

        self.store
            .update(&self.entry_ref(response), &[FieldUpdate::increment(&field, delta)])
            .await?;
        Ok(CounterChange::ReactionCounted { field, delta })
    }

    async fn move_reaction(
        &self,
        before: &ResponseSnapshot,
        after: &ResponseSnapshot,
    ) -> Result<CounterChange> {
        let (Some(from), Some(to)) = (before.reaction_field(), after.reaction_field()) else {
            return Err(AppError::Validation(
                "reaction response without reaction".to_string(),
            ));
        };
        if from == to {
            return Ok(CounterChange::Unchanged);
        }

        self.store
            .update(
                &self.entry_ref(after),
                &[
                    FieldUpdate::increment(&from, -1),
                    FieldUpdate::increment(&to, 1),
                ],
            )
            .await?;
        Ok(CounterChange::ReactionMoved { from, to })
    }

    /// Best effort: failures are logged and never undo the counters.
    async fn notify_parent_author(&self, response: &ResponseSnapshot, parent: &Document) -> bool {
        let Some(author) = parent.get_str("user_id").filter(|id| !id.is_empty()) else {
            return false;
        };
        if author == response.user_id {
            return false;
        }

        let payload = self.reply_payload(author, response);
        match self.notifier.notify(payload).await {
            Ok(report) => {
                info!(user_id = %author, parent_id = %parent.id(), sent = report.sent, "Reply notification sent");
                true
            }
            Err(e) => {
                warn!(user_id = %author, parent_id = %parent.id(), error = %e, "Reply notification failed");
                false
            }
        }
    }

    fn reply_payload(&self, recipient: &str, response: &ResponseSnapshot) -> NotificationPayload {
        let name = if response.user.name.is_empty() {
            "Seseorang"
        } else {
            response.user.name.as_str()
        };
        let entry = &response.entry;

        NotificationPayload {
            user_id: recipient.to_string(),
            title: self.reply_title.replace("{name}", name),
            body: response.comment.clone(),
            image: Some(response.user.avatar.clone()).filter(|a| !a.is_empty()),
            collapse_key: None,
            data: NotificationData {
                click_action: self.click_action.clone(),
                data_type: DATA_TYPE_RESPONSE.to_string(),
                entry_title: entry.title.clone(),
                entry_id: entry.id.to_string(),
                category_id: entry.category_id.to_string(),
                category_title: String::new(),
                feed_id: entry.feed_id.to_string(),
                published_at: entry.published_at.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::push::DispatchReport;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<NotificationPayload>>,
    }

    #[async_trait]
    impl Notifier for Recorder {
        async fn notify(&self, payload: NotificationPayload) -> Result<DispatchReport> {
            self.sent.lock().unwrap().push(payload);
            Ok(DispatchReport::default())
        }
    }

    fn setup() -> (Arc<MemoryStore>, Arc<Recorder>, CounterAggregator) {
        setup_with_title("{name} membalas komentar anda:")
    }

    fn setup_with_title(reply_title: &str) -> (Arc<MemoryStore>, Arc<Recorder>, CounterAggregator) {
        let store = Arc::new(MemoryStore::new());
        let recorder = Arc::new(Recorder::default());
        let aggregator = CounterAggregator::new(
            store.clone(),
            Arc::new(CategoryResolver::default()),
            recorder.clone(),
            "FLUTTER_NOTIFICATION_CLICK",
            reply_title,
        );
        (store, recorder, aggregator)
    }

    fn created(value: serde_json::Value) -> ChangeEvent<ResponseSnapshot> {
        ChangeEvent {
            id: "new".to_string(),
            timestamp: String::new(),
            before: None,
            after: Some(serde_json::from_value(value).unwrap()),
        }
    }

    async fn put(store: &MemoryStore, doc: DocRef, value: serde_json::Value) {
        let serde_json::Value::Object(data) = value else {
            panic!("expected object");
        };
        store.set(&doc, data).await.unwrap();
    }

    #[tokio::test]
    async fn test_comment_on_routed_collection() {
        let (store, _, aggregator) = setup();
        put(&store, DocRef::new("kriminal", "5"), json!({})).await;

        let change = aggregator
            .apply(&created(json!({
                "user_id": "u1", "type": "COMMENT", "entry_id": 5, "entry_category_id": 11
            })))
            .await
            .unwrap();

        assert_eq!(
            change,
            CounterChange::CommentAdded {
                ancestors: 0,
                notified: false
            }
        );
        let entry = store.get(&DocRef::new("kriminal", "5")).await.unwrap().unwrap();
        assert_eq!(entry.get_i64(COMMENT_COUNT), Some(1));
    }

    #[tokio::test]
    async fn test_nested_reply_counts_parent_and_thread() {
        let (store, recorder, aggregator) = setup();
        put(&store, DocRef::new("entries", "1"), json!({"comment_count": 2})).await;
        put(&store, DocRef::new(ENTRY_RESPONSES, "c1"), json!({"user_id": "a"})).await;
        put(&store, DocRef::new(ENTRY_RESPONSES, "r1"), json!({"user_id": "b", "reply_count": 0})).await;

        let change = aggregator
            .apply(&created(json!({
                "user_id": "c", "type": "COMMENT", "entry_id": 1, "entry_category_id": 2,
                "parent_id": "r1", "thread_id": "c1", "comment": "agreed",
                "user": {"name": "Komang", "avatar": "https://a/k.png"}
            })))
            .await
            .unwrap();

        assert_eq!(
            change,
            CounterChange::CommentAdded {
                ancestors: 2,
                notified: true
            }
        );
        let get = |id: &'static str| {
            let store = store.clone();
            async move { store.get(&DocRef::new(ENTRY_RESPONSES, id)).await.unwrap().unwrap() }
        };
        assert_eq!(get("c1").await.get_i64(REPLY_COUNT), Some(1));
        assert_eq!(get("r1").await.get_i64(REPLY_COUNT), Some(1));

        let sent = recorder.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].user_id, "b");
        assert_eq!(sent[0].title, "Komang membalas komentar anda:");
        assert_eq!(sent[0].body, "agreed");
        assert_eq!(sent[0].image.as_deref(), Some("https://a/k.png"));
        assert_eq!(sent[0].data.data_type, DATA_TYPE_RESPONSE);
    }

    #[tokio::test]
    async fn test_reply_title_template() {
        let (store, recorder, aggregator) = setup_with_title("{name} replied to your comment:");
        put(&store, DocRef::new("entries", "1"), json!({})).await;
        put(&store, DocRef::new(ENTRY_RESPONSES, "c1"), json!({"user_id": "a"})).await;

        for (id, user) in [("r1", json!({"name": "Komang"})), ("r2", json!({}))] {
            aggregator
                .apply(&ChangeEvent {
                    id: id.to_string(),
                    ..created(json!({
                        "user_id": "c", "type": "COMMENT", "entry_id": 1,
                        "parent_id": "c1", "thread_id": "c1", "comment": "ok", "user": user
                    }))
                })
                .await
                .unwrap();
        }

        let sent = recorder.sent.lock().unwrap();
        let titles: Vec<&str> = sent.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["Komang replied to your comment:", "Seseorang replied to your comment:"]);
    }

    #[tokio::test]
    async fn test_missing_ancestors_are_skipped() {
        let (store, recorder, aggregator) = setup();
        put(&store, DocRef::new("entries", "1"), json!({})).await;

        let change = aggregator
            .apply(&created(json!({
                "user_id": "c", "type": "COMMENT", "entry_id": 1,
                "parent_id": "gone", "thread_id": "also-gone"
            })))
            .await
            .unwrap();

        assert_eq!(
            change,
            CounterChange::CommentAdded {
                ancestors: 0,
                notified: false
            }
        );
        assert!(recorder.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reply_to_own_comment_is_not_notified() {
        let (store, recorder, aggregator) = setup();
        put(&store, DocRef::new("entries", "1"), json!({})).await;
        put(&store, DocRef::new(ENTRY_RESPONSES, "c1"), json!({"user_id": "u1"})).await;

        aggregator
            .apply(&created(json!({
                "user_id": "u1", "type": "COMMENT", "entry_id": 1,
                "parent_id": "c1", "thread_id": "c1", "comment": "edit: typo"
            })))
            .await
            .unwrap();

        assert!(recorder.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_comment_on_missing_entry_fails() {
        let (_, _, aggregator) = setup();
        let err = aggregator
            .apply(&created(json!({"user_id": "u", "type": "COMMENT", "entry_id": 404})))
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_reaction_without_value_is_rejected() {
        let (store, _, aggregator) = setup();
        put(&store, DocRef::new("entries", "1"), json!({})).await;

        let err = aggregator
            .apply(&created(json!({"user_id": "u", "type": "REACTION", "entry_id": 1})))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_comment_edit_is_unchanged() {
        let (_, _, aggregator) = setup();
        let snapshot: ResponseSnapshot = serde_json::from_value(json!({
            "user_id": "u", "type": "COMMENT", "entry_id": 1, "comment": "v2"
        }))
        .unwrap();
        let event = ChangeEvent {
            id: "c1".to_string(),
            timestamp: String::new(),
            before: Some(snapshot.clone()),
            after: Some(snapshot),
        };

        assert_eq!(aggregator.apply(&event).await.unwrap(), CounterChange::Unchanged);
    }

    #[tokio::test]
    async fn test_delete_reply_keeps_ancestor_counts() {
        let (store, _, aggregator) = setup();
        put(&store, DocRef::new("entries", "1"), json!({"comment_count": 2})).await;
        put(&store, DocRef::new(ENTRY_RESPONSES, "c1"), json!({"reply_count": 1})).await;

        let event = ChangeEvent {
            id: "r1".to_string(),
            timestamp: String::new(),
            before: Some(
                serde_json::from_value(json!({
                    "user_id": "u", "type": "COMMENT", "entry_id": 1,
                    "parent_id": "c1", "thread_id": "c1"
                }))
                .unwrap(),
            ),
            after: None,
        };

        let change = aggregator.apply(&event).await.unwrap();
        assert_eq!(change, CounterChange::CommentRemoved { pruned: 0 });

        let entry = store.get(&DocRef::new("entries", "1")).await.unwrap().unwrap();
        assert_eq!(entry.get_i64(COMMENT_COUNT), Some(1));
        let thread = store.get(&DocRef::new(ENTRY_RESPONSES, "c1")).await.unwrap().unwrap();
        assert_eq!(thread.get_i64(REPLY_COUNT), Some(1));
    }
}
