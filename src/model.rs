//! Core data model.
//!
//! An item is something with a due date. It has identity, a description,
//! a lifecycle status, and audit timestamps. A scheduled job is the
//! scheduler's in-memory watch over one item's due date.

pub mod item;
pub mod job;

pub use item::{Item, ItemId, ItemPatch, NewItem, Status};
pub use job::{JobState, ScheduledJob};
