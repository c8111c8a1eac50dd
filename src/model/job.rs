//! Scheduled jobs: the scheduler's in-memory view of one item's timer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::item::ItemId;

/// A timer watching one item's due date. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub item_id: ItemId,
    /// The due date this job was armed for.
    pub fire_at: DateTime<Utc>,
    pub state: JobState,
    /// Bumped on every arm. Lets the scheduler ignore superseded timers.
    pub generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Armed,
    Fired,
    Cancelled,
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobState::Armed => "armed",
            JobState::Fired => "fired",
            JobState::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}
