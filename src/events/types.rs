//! Typed change-event snapshots.
//!
//! Events arrive as JSON `{id, timestamp, before, after}`. Entry events from
//! older publishers carry the new snapshot under `data` instead of `after`.

use serde::Deserialize;

/// A document mutation: `before` and `after` snapshots of one document.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChangeEvent<T> {
    /// ID of the mutated document.
    #[serde(default)]
    pub id: String,
    /// Time the mutation was observed, as sent by the publisher.
    #[serde(default)]
    pub timestamp: String,
    pub before: Option<T>,
    #[serde(alias = "data")]
    pub after: Option<T>,
}

/// Kind of mutation carried by a [`ChangeEvent`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transition<'a, T> {
    Created(&'a T),
    Updated { before: &'a T, after: &'a T },
    Deleted(&'a T),
}

impl<T> ChangeEvent<T> {
    /// Classify the event. Returns `None` when both snapshots are absent.
    pub fn transition(&self) -> Option<Transition<'_, T>> {
        match (&self.before, &self.after) {
            (None, Some(after)) => Some(Transition::Created(after)),
            (Some(before), Some(after)) => Some(Transition::Updated { before, after }),
            (Some(before), None) => Some(Transition::Deleted(before)),
            (None, None) => None,
        }
    }
}

/// Media attached to an entry.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct Enclosure {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub mime_type: String,
}

/// Entry fields used for subscriber notification.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EntrySnapshot {
    pub id: i64,
    pub title: String,
    pub feed_id: i64,
    #[serde(default)]
    pub category_id: i64,
    /// Legacy multi-category list.
    #[serde(default)]
    pub categories: Vec<i64>,
    /// Epoch milliseconds.
    #[serde(default)]
    pub published_at: i64,
    #[serde(default)]
    pub enclosures: Option<Vec<Enclosure>>,
}

impl EntrySnapshot {
    /// Category of the entry, falling back to the first legacy category.
    pub fn primary_category(&self) -> i64 {
        if self.category_id != 0 {
            return self.category_id;
        }
        self.categories.first().copied().unwrap_or(0)
    }

    /// URL of the first enclosure that has one.
    pub fn image(&self) -> Option<&str> {
        self.enclosures
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|e| e.url.as_str())
            .find(|url| !url.is_empty())
    }
}

/// Response type discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseKind {
    Comment,
    Reaction,
}

/// Author summary embedded in a response.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct Author {
    pub id: String,
    pub name: String,
    pub avatar: String,
}

/// Entry summary embedded in a response, used for deep links.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct EntrySummary {
    pub id: i64,
    pub title: String,
    pub category_id: i64,
    pub feed_id: i64,
    pub published_at: i64,
}

/// A comment or reaction on an entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ResponseSnapshot {
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: ResponseKind,
    pub entry_id: i64,
    #[serde(default)]
    pub entry_category_id: i64,
    #[serde(default)]
    pub entry_feed_id: i64,
    /// Direct parent; empty for a top-level comment.
    #[serde(default)]
    pub parent_id: String,
    /// Top-level ancestor; empty for a top-level comment.
    #[serde(default)]
    pub thread_id: String,
    #[serde(default)]
    pub reaction: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub entry: EntrySummary,
    #[serde(default)]
    pub user: Author,
}

impl ResponseSnapshot {
    /// Check if this is a reply within a thread.
    pub fn is_reply(&self) -> bool {
        !self.parent_id.is_empty() && !self.thread_id.is_empty()
    }

    /// Check if this is a reply to a reply (second level or deeper).
    pub fn is_nested_reply(&self) -> bool {
        self.is_reply() && self.parent_id != self.thread_id
    }

    /// Entry counter tracking this response's reaction kind.
    pub fn reaction_field(&self) -> Option<String> {
        let kind = self.reaction.trim().to_lowercase();
        if kind.is_empty() {
            None
        } else {
            Some(format!("reaction_{}_count", kind))
        }
    }
}
