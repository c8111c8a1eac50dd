//! Status state machine.
//!
//! Pure functions: given the current item (or a creation request) and the
//! caller's requested changes, produce the item to persist or reject the
//! request. No I/O happens here; the service persists the result and the
//! scheduler arms timers based on [`Applied::rearm`].

use chrono::{DateTime, SubsecRound, Utc};

use crate::error::{Error, Result};
use crate::model::{Item, ItemId, ItemPatch, NewItem, Status};

pub const DESCRIPTION_MAX_LEN: usize = 500;

/// Sub-second digits kept on every timestamp. Matches Postgres `timestamptz`,
/// so an item reads back exactly as it was written.
const TIMESTAMP_DIGITS: u16 = 6;

fn stored(at: DateTime<Utc>) -> DateTime<Utc> {
    at.trunc_subsecs(TIMESTAMP_DIGITS)
}

/// Outcome of applying an update to an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    /// The item as it should be written.
    pub item: Item,
    /// The scheduler must (re)arm a timer for this item.
    pub rearm: bool,
}

/// Validate a creation request and build the item to persist.
pub fn validate_new(new: NewItem, now: DateTime<Utc>) -> Result<Item> {
    validate_description(&new.description)?;
    let now = stored(now);

    let status = new.status.unwrap_or(Status::Pending);
    let completed_date = match status {
        Status::Pending if new.completed_date.is_some() => {
            return Err(Error::Validation(
                "a pending item cannot have a completed date".to_string(),
            ));
        }
        Status::Pending => None,
        Status::Completed => Some(new.completed_date.map(stored).unwrap_or(now)),
        Status::Overdue => {
            return Err(Error::Validation(
                "items cannot be created as overdue".to_string(),
            ));
        }
    };

    let item = Item {
        id: ItemId::new(),
        description: new.description,
        status,
        due_date: stored(new.due_date),
        completed_date,
        created_at: now,
        updated_at: now,
    };
    item.check_invariants()?;
    Ok(item)
}

/// Apply a partial update to `current`.
///
/// Overdue items are immutable. Requests to set `Overdue` directly are
/// rejected: only due-date expiry moves an item there.
pub fn apply_update(current: &Item, patch: &ItemPatch, now: DateTime<Utc>) -> Result<Applied> {
    if current.status.is_terminal() {
        return Err(Error::Conflict(format!(
            "item {} is {} and cannot be updated",
            current.id, current.status
        )));
    }

    let now = stored(now);
    let from = current.status;
    let to = patch.status.unwrap_or(from);
    if to == Status::Overdue {
        return Err(Error::Validation(
            "status cannot be set to overdue explicitly".to_string(),
        ));
    }
    if !from.can_transition_to(to) {
        return Err(Error::Validation(format!(
            "invalid status transition: {from} -> {to}"
        )));
    }

    let patched_completed = patch.completed_date.map(stored);
    let completed_date = match (from, to) {
        (Status::Pending, Status::Completed) => Some(patched_completed.unwrap_or(now)),
        (Status::Completed, Status::Completed) => patched_completed.or(current.completed_date),
        (_, Status::Pending) => {
            if patched_completed.is_some() {
                return Err(Error::Validation(
                    "a pending item cannot have a completed date".to_string(),
                ));
            }
            None
        }
        _ => {
            return Err(Error::Validation(format!(
                "invalid status transition: {from} -> {to}"
            )));
        }
    };

    let mut item = current.clone();
    if let Some(ref description) = patch.description {
        validate_description(description)?;
        item.description = description.clone();
    }
    let patched_due = patch.due_date.map(stored);
    let due_date_changed = patched_due.is_some_and(|d| d != current.due_date);
    if let Some(due_date) = patched_due {
        item.due_date = due_date;
    }
    item.status = to;
    item.completed_date = completed_date;
    item.updated_at = now;
    item.check_invariants()?;

    let reopened = from != Status::Pending && to == Status::Pending;
    let rearm = to == Status::Pending && (due_date_changed || reopened);
    Ok(Applied { item, rearm })
}

fn validate_description(description: &str) -> Result<()> {
    let len = description.chars().count();
    if description.trim().is_empty() {
        return Err(Error::Validation("description may not be empty".to_string()));
    }
    if len > DESCRIPTION_MAX_LEN {
        return Err(Error::Validation(format!(
            "description must be at most {DESCRIPTION_MAX_LEN} characters long, got {len}"
        )));
    }
    Ok(())
}
