//! Metric instrument factories for duewatch.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"duewatch"` meter.

use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Histogram, Meter};

use crate::model::Status;

/// Returns the shared meter for duewatch instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("duewatch")
}

/// Counter: items created.
/// Labels: `status`.
pub fn items_created() -> Counter<u64> {
    meter()
        .u64_counter("duewatch.items.created")
        .with_description("Number of items created")
        .build()
}

/// Counter: item status transitions applied by the store.
/// Labels: `from`, `to`.
pub fn item_status_transitions() -> Counter<u64> {
    meter()
        .u64_counter("duewatch.items.status_transitions")
        .with_description("Number of item status transitions")
        .build()
}

/// Record `count` applied transitions from `from` to `to`.
pub fn record_transition(from: Status, to: Status, count: u64) {
    if count == 0 {
        return;
    }
    item_status_transitions().add(
        count,
        &[
            KeyValue::new("from", from.to_string()),
            KeyValue::new("to", to.to_string()),
        ],
    );
}

/// Counter: scheduler job lifecycle events.
/// Labels: `state` ("armed" | "fired" | "cancelled"), `reason` for cancellations.
pub fn job_events() -> Counter<u64> {
    meter()
        .u64_counter("duewatch.jobs.events")
        .with_description("Number of scheduler job state changes")
        .build()
}

/// Counter: items moved to overdue by the sweeper.
pub fn sweep_items() -> Counter<u64> {
    meter()
        .u64_counter("duewatch.sweep.items")
        .with_description("Items transitioned by reconciliation sweeps")
        .build()
}

/// Histogram: sweep duration in milliseconds.
/// Labels: `result` ("ok" | "error").
pub fn sweep_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("duewatch.sweep.duration_ms")
        .with_description("Reconciliation sweep duration in milliseconds")
        .with_unit("ms")
        .build()
}
