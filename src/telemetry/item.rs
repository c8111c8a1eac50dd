//! Span helpers for the timer and sweep paths.

use tracing::Span;

use crate::model::ItemId;

/// Start a span for one timer firing.
///
/// The `job.outcome` field is declared empty and filled in via
/// [`record_fire_outcome`] once the firing protocol settles.
pub fn start_fire_span(id: ItemId, generation: u64) -> Span {
    tracing::info_span!(
        "job.fire",
        "item.id" = %id,
        "job.generation" = generation,
        "job.outcome" = tracing::field::Empty,
    )
}

/// Record how a firing ended ("fired" or a cancellation reason).
pub fn record_fire_outcome(span: &Span, outcome: &str) {
    span.record("job.outcome", outcome);
}

/// Start a span for one reconciliation sweep.
pub fn start_sweep_span() -> Span {
    tracing::info_span!("sweep", "sweep.count" = tracing::field::Empty)
}

/// Record how many items a sweep transitioned.
pub fn record_sweep_count(span: &Span, count: usize) {
    span.record("sweep.count", count as u64);
}
