//! Lifecycle metrics are recorded by the engine, whatever the store.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, TimeZone, Utc};
use duewatch::clock::{Clock, ManualClock};
use duewatch::engine::{DueDateScheduler, SweepConfig, Sweeper};
use duewatch::event::EventBus;
use duewatch::model::*;
use duewatch::service::ItemService;
use duewatch::store::{ItemStore, MemoryStore};
use opentelemetry_sdk::metrics::data::{AggregatedMetrics, MetricData, ResourceMetrics};
use opentelemetry_sdk::metrics::{InMemoryMetricExporter, PeriodicReader, SdkMeterProvider};

/// Sum of a u64 counter's data points whose attributes include every pair in
/// `labels`, taken from the latest export.
fn counter(exported: &[ResourceMetrics], name: &str, labels: &[(&str, &str)]) -> u64 {
    let Some(latest) = exported.last() else {
        return 0;
    };
    let mut total = 0;
    for scope in latest.scope_metrics() {
        for metric in scope.metrics().filter(|m| m.name() == name) {
            let AggregatedMetrics::U64(MetricData::Sum(sum)) = metric.data() else {
                continue;
            };
            for point in sum.data_points() {
                let matches = labels.iter().all(|(key, value)| {
                    point.attributes().any(|kv| {
                        kv.key.as_str() == *key && kv.value.as_str() == *value
                    })
                });
                if matches {
                    total += point.value();
                }
            }
        }
    }
    total
}

// Installs the global meter provider, so this binary holds a single test.
#[tokio::test]
async fn engine_records_creations_and_transitions_with_memory_store() {
    let exporter = InMemoryMetricExporter::default();
    let provider = SdkMeterProvider::builder()
        .with_reader(PeriodicReader::builder(exporter.clone()).build())
        .build();
    opentelemetry::global::set_meter_provider(provider.clone());

    let t0 = Utc.with_ymd_and_hms(2026, 10, 14, 12, 0, 0).unwrap();
    let store = Arc::new(MemoryStore::new());
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(t0));
    let events = EventBus::new();
    let (scheduler, _) =
        DueDateScheduler::start(store.clone(), clock.clone(), events.clone(), false);
    let service = ItemService::new(store.clone(), scheduler.clone(), clock.clone());
    let sweeper = Sweeper::new(
        store.clone(),
        scheduler,
        clock,
        events,
        SweepConfig {
            interval: StdDuration::from_secs(60),
            initial_delay: StdDuration::ZERO,
        },
    );

    let late = service
        .create(NewItem::new("late", t0 - Duration::hours(1)))
        .await
        .unwrap();
    let done = service
        .create(NewItem::new("done", t0 + Duration::hours(1)))
        .await
        .unwrap();
    service
        .create(NewItem::new("already", t0).status(Status::Completed))
        .await
        .unwrap();
    service
        .update(done.id, ItemPatch::new().status(Status::Completed))
        .await
        .unwrap();
    // Description edits are not transitions.
    service
        .update(late.id, ItemPatch::new().description("still late"))
        .await
        .unwrap();
    assert_eq!(sweeper.sweep_once().await.unwrap().ids, vec![late.id]);
    assert_eq!(store.get(late.id).await.unwrap().status, Status::Overdue);

    provider.force_flush().unwrap();
    let exported = exporter.get_finished_metrics().unwrap();

    assert_eq!(counter(&exported, "duewatch.items.created", &[]), 3);
    assert_eq!(
        counter(&exported, "duewatch.items.created", &[("status", "completed")]),
        1
    );
    assert_eq!(
        counter(
            &exported,
            "duewatch.items.status_transitions",
            &[("from", "pending"), ("to", "completed")]
        ),
        1
    );
    assert_eq!(
        counter(
            &exported,
            "duewatch.items.status_transitions",
            &[("from", "pending"), ("to", "overdue")]
        ),
        1
    );
    assert_eq!(counter(&exported, "duewatch.sweep.items", &[]), 1);
}
