//! Trait definitions organizing the core's operations by area.
//!
//! Collaborators see two surfaces: `StoreOperations` for everything the item
//! store answers directly (loading itemsets, status bulk updates, counters),
//! and `SubscriptionOperations` for the fetch-and-merge lifecycle. Both are
//! implemented by [`FeedCore`](crate::FeedCore); the traits exist to keep
//! the surfaces separable and mockable in tests.

use async_trait::async_trait;

use crate::core::{RefreshSummary, UpdateFlags};
use crate::error::Result;
use crate::item::Item;
use crate::subscription::SubscriptionOptions;

/// Item store surface: synchronous accessors over the SQLite backend.
pub trait StoreOperations {
    /// Loads all items of a node.
    fn load_itemset(&self, node_id: &str) -> Result<Vec<Item>>;
    /// Loads a single item by its numeric id.
    fn load_item(&self, id: i64) -> Result<Option<Item>>;
    /// Marks every item of the node read.
    fn mark_all_read(&self, node_id: &str) -> Result<()>;
    /// Clears the updated flag on every item of the node.
    fn mark_all_updated(&self, node_id: &str) -> Result<()>;
    /// Clears the new flag on every item of the node.
    fn mark_all_old(&self, node_id: &str) -> Result<()>;
    /// Clears the popup flag on every item of the node.
    fn mark_all_popup(&self, node_id: &str) -> Result<()>;
    /// Removes a single item.
    fn remove_item(&self, id: i64) -> Result<()>;
    /// Removes all items of a node.
    fn remove_itemset(&self, node_id: &str) -> Result<()>;
    /// Number of unread items in a node.
    fn unread_count(&self, node_id: &str) -> Result<u32>;
}

/// Subscription lifecycle surface.
#[async_trait]
pub trait SubscriptionOperations {
    /// Registers a new subscription, returning its node id.
    fn subscribe(&self, source: &str, options: SubscriptionOptions) -> Result<String>;
    /// Removes a subscription together with its stored items.
    fn unsubscribe(&self, node_id: &str) -> Result<()>;
    /// Refreshes one subscription and waits for the merged outcome.
    async fn update(&self, node_id: &str, flags: UpdateFlags) -> Result<RefreshSummary>;
    /// Flips the process-wide online gate.
    fn set_online(&self, online: bool);
    fn is_online(&self) -> bool;
}

impl StoreOperations for crate::FeedCore {
    fn load_itemset(&self, node_id: &str) -> Result<Vec<Item>> {
        self.store().load_itemset(node_id)
    }

    fn load_item(&self, id: i64) -> Result<Option<Item>> {
        self.store().load_item(id)
    }

    fn mark_all_read(&self, node_id: &str) -> Result<()> {
        self.store().mark_all_read(node_id)
    }

    fn mark_all_updated(&self, node_id: &str) -> Result<()> {
        self.store().mark_all_updated(node_id)
    }

    fn mark_all_old(&self, node_id: &str) -> Result<()> {
        self.store().mark_all_old(node_id)
    }

    fn mark_all_popup(&self, node_id: &str) -> Result<()> {
        self.store().mark_all_popup(node_id)
    }

    fn remove_item(&self, id: i64) -> Result<()> {
        self.store().remove_item(id)
    }

    fn remove_itemset(&self, node_id: &str) -> Result<()> {
        self.store().remove_itemset(node_id)
    }

    fn unread_count(&self, node_id: &str) -> Result<u32> {
        self.store().unread_count(node_id)
    }
}

#[async_trait]
impl SubscriptionOperations for crate::FeedCore {
    fn subscribe(&self, source: &str, options: SubscriptionOptions) -> Result<String> {
        crate::FeedCore::subscribe(self, source, options)
    }

    fn unsubscribe(&self, node_id: &str) -> Result<()> {
        crate::FeedCore::unsubscribe(self, node_id)
    }

    async fn update(&self, node_id: &str, flags: UpdateFlags) -> Result<RefreshSummary> {
        crate::FeedCore::update(self, node_id, flags).await
    }

    fn set_online(&self, online: bool) {
        crate::FeedCore::set_online(self, online)
    }

    fn is_online(&self) -> bool {
        crate::FeedCore::is_online(self)
    }
}
