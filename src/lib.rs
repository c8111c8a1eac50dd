//! # duewatch
//!
//! Due-date lifecycle engine. Items carry a due date and a status; when the
//! due date passes while an item is still pending, the engine moves it to
//! overdue exactly once.
//!
//! Two paths enforce this: a per-item timer for low latency
//! ([`engine::scheduler`]) and a periodic bulk sweep for crash safety
//! ([`engine::sweeper`]). Both go through the same conditional store write,
//! so either alone is enough for correctness.

pub mod clock;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod event;
pub mod lifecycle;
pub mod model;
pub mod service;
pub mod store;
pub mod telemetry;
