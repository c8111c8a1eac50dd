//! Structured events emitted by the engine.
//!
//! Every job state change and every completed sweep is published on a
//! broadcast channel. Consumers subscribe to build dashboards, alerting,
//! or to assert on engine behavior in tests. A lagging or absent
//! subscriber never slows the engine down.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::model::ItemId;

const CHANNEL_CAPACITY: usize = 1024;

/// A structured event emitted by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// When this event occurred, according to the engine's clock.
    pub timestamp: DateTime<Utc>,
    /// What happened.
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    JobArmed {
        id: ItemId,
        fire_at: DateTime<Utc>,
    },
    /// The timer moved the item to overdue.
    JobFired {
        id: ItemId,
    },
    JobCancelled {
        id: ItemId,
        reason: CancelReason,
    },
    SweepCompleted {
        ids: Vec<ItemId>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// A newer arm replaced this job.
    Superseded,
    /// Cancelled by a caller (usually the sweeper).
    Requested,
    /// The item was gone when the timer fired.
    ItemMissing,
    /// The item had already left pending when the timer fired.
    NotPending,
    /// The item's due date changed after this job was armed.
    DueDateChanged,
    /// Another writer moved the item first.
    LostRace,
    /// The store failed during the firing check.
    StoreError,
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CancelReason::Superseded => "superseded",
            CancelReason::Requested => "requested",
            CancelReason::ItemMissing => "item_missing",
            CancelReason::NotPending => "not_pending",
            CancelReason::DueDateChanged => "due_date_changed",
            CancelReason::LostRace => "lost_race",
            CancelReason::StoreError => "store_error",
        };
        write!(f, "{s}")
    }
}

/// Sending half of the engine's event stream.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    pub(crate) fn emit(&self, timestamp: DateTime<Utc>, kind: EventKind) {
        // No subscribers is not an error.
        let _ = self.tx.send(Event { timestamp, kind });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
