//! Subscriber fan-out for new entries.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use super::category::CategoryResolver;
use super::types::EntrySnapshot;
use crate::push::{NotificationData, NotificationPayload, Notifier, DATA_TYPE_ENTRY};
use crate::store::{subscribers_collection, DocRef, Document, DocumentStore, USERS};
use crate::Result;

/// Counts from one fan-out run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanoutReport {
    /// Resolved subscription category.
    pub category: String,
    /// Subscriber documents found.
    pub subscribers: usize,
    /// Notifications handed to the notifier successfully.
    pub notified: usize,
    /// Stale subscriber documents deleted.
    pub pruned: usize,
    /// Subscribers that failed (lookup, delete or delivery).
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubscriberOutcome {
    Notified,
    Pruned,
    Failed,
}

/// Notifies the subscribers of an entry's category.
pub struct SubscriberFanout {
    store: Arc<dyn DocumentStore>,
    resolver: Arc<CategoryResolver>,
    notifier: Arc<dyn Notifier>,
    click_action: String,
    concurrency: usize,
}

impl SubscriberFanout {
    /// Create a fan-out handling up to `concurrency` subscribers at a time.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        resolver: Arc<CategoryResolver>,
        notifier: Arc<dyn Notifier>,
        click_action: impl Into<String>,
        concurrency: usize,
    ) -> Self {
        Self {
            store,
            resolver,
            notifier,
            click_action: click_action.into(),
            concurrency: concurrency.max(1),
        }
    }

    /// Notify every live subscriber of the entry's category.
    ///
    /// Returns `None` when the category does not exist. Per-subscriber
    /// failures are logged and counted, never returned.
    pub async fn notify_subscribers(&self, entry: &EntrySnapshot) -> Result<Option<FanoutReport>> {
        let category_id = entry.primary_category();
        let key = self.resolver.resolve(category_id, entry.feed_id);

        let Some(category) = self
            .resolver
            .find_category(self.store.as_ref(), &key)
            .await?
        else {
            warn!(category = %key, entry_id = entry.id, "Category does not exist, skipping fan-out");
            return Ok(None);
        };

        let title = if category.title.is_empty() {
            key.clone()
        } else {
            category.title
        };
        let template = self.entry_payload(entry, category_id, &title);

        let subscribers = self.store.list(&subscribers_collection(&key)).await?;
        let mut report = FanoutReport {
            category: key.clone(),
            subscribers: subscribers.len(),
            ..FanoutReport::default()
        };

        let outcomes: Vec<SubscriberOutcome> = stream::iter(subscribers)
            .map(|subscriber| self.process(subscriber, &template, &key))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                SubscriberOutcome::Notified => report.notified += 1,
                SubscriberOutcome::Pruned => report.pruned += 1,
                SubscriberOutcome::Failed => report.failed += 1,
            }
        }

        info!(
            category = %key,
            entry_id = entry.id,
            subscribers = report.subscribers,
            notified = report.notified,
            pruned = report.pruned,
            failed = report.failed,
            "Fan-out finished"
        );
        Ok(Some(report))
    }

    async fn process(
        &self,
        subscriber: Document,
        template: &NotificationPayload,
        category: &str,
    ) -> SubscriberOutcome {
        let user_id = subscriber
            .get_str("user_id")
            .filter(|id| !id.is_empty())
            .map(str::to_string);

        let exists = match &user_id {
            Some(user_id) => match self.store.get(&DocRef::new(USERS, user_id.as_str())).await {
                Ok(user) => user.is_some(),
                Err(e) => {
                    warn!(category, user_id = %user_id, error = %e, "Failed to look up subscriber");
                    return SubscriberOutcome::Failed;
                }
            },
            None => false,
        };

        let Some(user_id) = user_id.filter(|_| exists) else {
            return self.prune(&subscriber, category).await;
        };

        match self.notifier.notify(template.for_user(user_id.as_str())).await {
            Ok(report) => {
                debug!(category, user_id = %user_id, sent = report.sent, "Subscriber notified");
                SubscriberOutcome::Notified
            }
            Err(e) => {
                warn!(category, user_id = %user_id, error = %e, "Failed to notify subscriber");
                SubscriberOutcome::Failed
            }
        }
    }

    async fn prune(&self, subscriber: &Document, category: &str) -> SubscriberOutcome {
        match self.store.delete(&subscriber.reference).await {
            Ok(()) => {
                info!(category, subscriber = %subscriber.id(), "Deleted stale subscriber");
                SubscriberOutcome::Pruned
            }
            Err(e) => {
                warn!(category, subscriber = %subscriber.id(), error = %e, "Failed to delete stale subscriber");
                SubscriberOutcome::Failed
            }
        }
    }

    fn entry_payload(
        &self,
        entry: &EntrySnapshot,
        category_id: i64,
        category_title: &str,
    ) -> NotificationPayload {
        NotificationPayload {
            user_id: String::new(),
            title: category_title.to_string(),
            body: entry.title.clone(),
            image: entry.image().map(str::to_string),
            collapse_key: None,
            data: NotificationData {
                click_action: self.click_action.clone(),
                data_type: DATA_TYPE_ENTRY.to_string(),
                entry_title: entry.title.clone(),
                entry_id: entry.id.to_string(),
                category_id: category_id.to_string(),
                category_title: category_title.to_string(),
                feed_id: entry.feed_id.to_string(),
                published_at: entry.published_at.to_string(),
            },
        }
    }
}
