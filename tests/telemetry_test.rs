//! Integration tests for telemetry initialization and span helpers.

use duewatch::model::ItemId;
use duewatch::telemetry::{TelemetryConfig, init_telemetry, item};

#[test]
fn telemetry_initializes_without_endpoint() {
    // A global subscriber can only be set once per process, so this is the
    // only test in this binary that installs one.
    let config = TelemetryConfig {
        endpoint: None,
        service_name: "duewatch-test".to_string(),
        log_level: "debug".to_string(),
    };
    let guard = init_telemetry(config).unwrap();
    assert!(!guard.is_exporting());
    guard.force_flush();
}

#[test]
fn fire_span_creates_and_records_outcome() {
    let span = item::start_fire_span(ItemId::new(), 7);
    item::record_fire_outcome(&span, "fired");
}

#[test]
fn sweep_span_creates_and_records_count() {
    let span = item::start_sweep_span();
    item::record_sweep_count(&span, 3);
}
