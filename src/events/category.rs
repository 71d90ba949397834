//! Category resolution and entry partitioning.

use std::collections::{HashMap, HashSet};

use serde::Deserialize;

use crate::config::CategoryConfig;
use crate::store::{DocRef, DocumentStore, CATEGORIES};
use crate::Result;

/// Category document fields used for notifications.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct Category {
    #[serde(default)]
    pub title: String,
}

/// Maps entries to their subscription category and storage collection.
#[derive(Debug, Clone)]
pub struct CategoryResolver {
    alternate_feeds: HashSet<i64>,
    alternate_category: String,
    routes: HashMap<i64, String>,
    overflow_above: Option<i64>,
    overflow_collection: String,
    default_collection: String,
}

impl CategoryResolver {
    /// Build a resolver from the category rules.
    pub fn new(config: &CategoryConfig) -> Self {
        Self {
            alternate_feeds: config.alternate_feed_ids.iter().copied().collect(),
            alternate_category: config.alternate_category.clone(),
            routes: config
                .collection_routes
                .iter()
                .map(|r| (r.category_id, r.collection.clone()))
                .collect(),
            overflow_above: config.overflow_above,
            overflow_collection: config.overflow_collection.clone(),
            default_collection: config.default_collection.clone(),
        }
    }

    /// Subscription category key for an entry.
    ///
    /// Entries from the alternate source resolve to the sentinel category
    /// regardless of their own category.
    pub fn resolve(&self, category_id: i64, feed_id: i64) -> String {
        if self.alternate_feeds.contains(&feed_id) {
            self.alternate_category.clone()
        } else {
            category_id.to_string()
        }
    }

    /// Collection holding entries of `category_id`.
    pub fn entry_collection(&self, category_id: i64) -> &str {
        if let Some(collection) = self.routes.get(&category_id) {
            return collection;
        }
        match self.overflow_above {
            Some(limit) if category_id > limit => &self.overflow_collection,
            _ => &self.default_collection,
        }
    }

    /// Reference to an entry document.
    pub fn entry_ref(&self, category_id: i64, entry_id: i64) -> DocRef {
        DocRef::new(self.entry_collection(category_id), entry_id.to_string())
    }

    /// Load a category document by key.
    pub async fn find_category(
        &self,
        store: &dyn DocumentStore,
        key: &str,
    ) -> Result<Option<Category>> {
        let doc = store.get(&DocRef::new(CATEGORIES, key)).await?;
        Ok(doc.map(|d| d.decode()).transpose()?)
    }
}

impl Default for CategoryResolver {
    fn default() -> Self {
        Self::new(&CategoryConfig::default())
    }
}
