//! Item store contract.
//!
//! The store is the source of truth for item status. Every status change the
//! engine makes goes through a conditional write, so the scheduler, the
//! sweeper and the foreground update path can race without double-applying a
//! transition.

pub mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::model::{Item, ItemId, Status};

/// Precondition for [`ItemStore::transition_if`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Guard {
    /// The stored status must equal this.
    pub status: Status,
    /// If set, the stored due date must equal this.
    pub due_date: Option<DateTime<Utc>>,
}

impl Guard {
    pub fn status(status: Status) -> Self {
        Self {
            status,
            due_date: None,
        }
    }

    pub fn due_on(mut self, due_date: DateTime<Utc>) -> Self {
        self.due_date = Some(due_date);
        self
    }

    pub fn matches(&self, item: &Item) -> bool {
        item.status == self.status && self.due_date.is_none_or(|d| d == item.due_date)
    }
}

#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Fetch an item. `Error::NotFound` if absent.
    async fn get(&self, id: ItemId) -> Result<Item>;

    /// Persist a new item.
    async fn create(&self, item: &Item) -> Result<ItemId>;

    /// All items, optionally filtered by status.
    async fn list(&self, status: Option<Status>) -> Result<Vec<Item>>;

    /// Overwrite an item only if its stored status is still `expected`.
    /// Returns whether the write was applied.
    async fn replace_if(&self, item: &Item, expected: Status) -> Result<bool>;

    /// Move one item to `to` only if it matches `guard`. Returns whether the
    /// write was applied. Only status and `updated_at` change.
    async fn transition_if(
        &self,
        id: ItemId,
        guard: Guard,
        to: Status,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// Move every pending item due at or before `now` to `to` in a single
    /// operation. Returns the ids that changed.
    async fn transition_due(&self, now: DateTime<Utc>, to: Status) -> Result<Vec<ItemId>>;
}
