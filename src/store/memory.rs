//! In-memory item store for tests and local runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::{Guard, ItemStore};
use crate::error::{Error, Result};
use crate::model::{Item, ItemId, Status};

/// All items behind one mutex. Each trait method holds the lock for its
/// whole check-then-write, which is what makes the conditional writes atomic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: Mutex<HashMap<ItemId, Item>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite an item unconditionally, bypassing the state machine.
    /// Simulates out-of-band writes such as a restored backup.
    pub fn put(&self, item: Item) {
        self.lock().insert(item.id, item);
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ItemId, Item>> {
        self.items.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ItemStore for MemoryStore {
    async fn get(&self, id: ItemId) -> Result<Item> {
        self.lock()
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("item {id}")))
    }

    async fn create(&self, item: &Item) -> Result<ItemId> {
        let mut items = self.lock();
        if items.contains_key(&item.id) {
            return Err(Error::Conflict(format!("item {} already exists", item.id)));
        }
        items.insert(item.id, item.clone());
        Ok(item.id)
    }

    async fn list(&self, status: Option<Status>) -> Result<Vec<Item>> {
        let mut items: Vec<Item> = self
            .lock()
            .values()
            .filter(|item| status.is_none_or(|s| item.status == s))
            .cloned()
            .collect();
        items.sort_by_key(|item| (item.created_at, item.id.0));
        Ok(items)
    }

    async fn replace_if(&self, item: &Item, expected: Status) -> Result<bool> {
        let mut items = self.lock();
        match items.get_mut(&item.id) {
            Some(stored) if stored.status == expected => {
                *stored = item.clone();
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(Error::NotFound(format!("item {}", item.id))),
        }
    }

    async fn transition_if(
        &self,
        id: ItemId,
        guard: Guard,
        to: Status,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut items = self.lock();
        match items.get_mut(&id) {
            Some(stored) if guard.matches(stored) => {
                stored.status = to;
                stored.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn transition_due(&self, now: DateTime<Utc>, to: Status) -> Result<Vec<ItemId>> {
        let mut items = self.lock();
        let mut changed = Vec::new();
        for item in items.values_mut() {
            if item.status == Status::Pending && item.due_date <= now {
                item.status = to;
                item.updated_at = now;
                changed.push(item.id);
            }
        }
        Ok(changed)
    }
}
