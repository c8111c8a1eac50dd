//! Items and their lifecycle status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Item
// ---------------------------------------------------------------------------

/// A work item tracked by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Unique identifier, immutable once assigned.
    pub id: ItemId,

    /// Free text describing the work.
    pub description: String,

    /// Current lifecycle status.
    pub status: Status,

    /// When the item becomes overdue if still pending.
    pub due_date: DateTime<Utc>,

    /// Set only while the status is `Completed`.
    pub completed_date: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Item {
    /// Check that `completed_date` is present iff the item is completed.
    pub fn check_invariants(&self) -> Result<()> {
        match (self.status, self.completed_date) {
            (Status::Completed, None) => Err(Error::Validation(format!(
                "item {} is completed but has no completed date",
                self.id
            ))),
            (Status::Pending | Status::Overdue, Some(_)) => Err(Error::Validation(format!(
                "item {} is {} but has a completed date",
                self.id, self.status
            ))),
            _ => Ok(()),
        }
    }
}

/// Newtype for item IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemId(pub Uuid);

impl ItemId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ItemId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| Error::Validation(format!("invalid item id '{s}': {e}")))
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Awaiting completion or due-date expiry.
    Pending,
    /// Done. Can be reopened.
    Completed,
    /// Due date elapsed while pending. Terminal.
    Overdue,
}

impl Status {
    /// Can transition from self to `to`?
    pub fn can_transition_to(self, to: Status) -> bool {
        use Status::*;
        matches!(
            (self, to),
            (Pending, Completed)
                | (Completed, Pending)   // reopened
                | (Pending, Overdue)     // due date elapsed
                | (Pending, Pending)     // field edits
                | (Completed, Completed)
        )
    }

    /// Is this a terminal status?
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Overdue)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Status::Pending => "pending",
            Status::Completed => "completed",
            Status::Overdue => "overdue",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Status::Pending),
            "completed" => Ok(Status::Completed),
            "overdue" => Ok(Status::Overdue),
            other => Err(Error::Validation(format!("unknown status '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Builder for creating new items. Validated by `lifecycle::validate_new`.
#[derive(Debug, Clone)]
pub struct NewItem {
    pub(crate) description: String,
    pub(crate) due_date: DateTime<Utc>,
    pub(crate) status: Option<Status>,
    pub(crate) completed_date: Option<DateTime<Utc>>,
}

impl NewItem {
    pub fn new(description: impl Into<String>, due_date: DateTime<Utc>) -> Self {
        Self {
            description: description.into(),
            due_date,
            status: None,
            completed_date: None,
        }
    }

    pub fn status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    pub fn completed_date(mut self, at: DateTime<Utc>) -> Self {
        self.completed_date = Some(at);
        self
    }
}

/// A partial update. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemPatch {
    pub description: Option<String>,
    pub status: Option<Status>,
    pub due_date: Option<DateTime<Utc>>,
    pub completed_date: Option<DateTime<Utc>>,
}

impl ItemPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    pub fn due_date(mut self, due_date: DateTime<Utc>) -> Self {
        self.due_date = Some(due_date);
        self
    }

    pub fn completed_date(mut self, at: DateTime<Utc>) -> Self {
        self.completed_date = Some(at);
        self
    }
}
