//! Foreground item operations.
//!
//! Create and update run the state machine before touching the store, write
//! conditionally on the status they read, and only then tell the scheduler.

use std::sync::Arc;

use opentelemetry::KeyValue;
use tracing::info;

use crate::clock::Clock;
use crate::engine::DueDateScheduler;
use crate::error::{Error, Result};
use crate::lifecycle;
use crate::model::{Item, ItemId, ItemPatch, NewItem, Status};
use crate::store::ItemStore;
use crate::telemetry::metrics;

#[derive(Clone)]
pub struct ItemService {
    store: Arc<dyn ItemStore>,
    scheduler: DueDateScheduler,
    clock: Arc<dyn Clock>,
}

impl ItemService {
    pub fn new(
        store: Arc<dyn ItemStore>,
        scheduler: DueDateScheduler,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            scheduler,
            clock,
        }
    }

    /// Validate and persist a new item, then arm its timer.
    pub async fn create(&self, new: NewItem) -> Result<Item> {
        let item = lifecycle::validate_new(new, self.clock.now())?;
        self.store.create(&item).await?;
        metrics::items_created().add(1, &[KeyValue::new("status", item.status.to_string())]);
        info!(id = %item.id, status = %item.status, due_date = %item.due_date, "item created");
        self.scheduler.on_item_created(&item);
        Ok(item)
    }

    /// Apply a partial update.
    ///
    /// Fails with `Conflict` if the item is overdue, or if its status changed
    /// between the read and the write (for example a sweep got there first).
    pub async fn update(&self, id: ItemId, patch: ItemPatch) -> Result<Item> {
        let current = self.store.get(id).await?;
        let applied = lifecycle::apply_update(&current, &patch, self.clock.now())?;

        if !self.store.replace_if(&applied.item, current.status).await? {
            return Err(Error::Conflict(format!(
                "item {id} changed while it was being updated"
            )));
        }
        if current.status != applied.item.status {
            metrics::record_transition(current.status, applied.item.status, 1);
        }
        info!(%id, from = %current.status, to = %applied.item.status, "item updated");

        if applied.rearm {
            self.scheduler.on_due_date_changed(&applied.item);
        } else if applied.item.status != Status::Pending {
            self.scheduler.cancel(id);
        }
        Ok(applied.item)
    }

    pub async fn get(&self, id: ItemId) -> Result<Item> {
        self.store.get(id).await
    }

    pub async fn list(&self, status: Option<Status>) -> Result<Vec<Item>> {
        self.store.list(status).await
    }
}
