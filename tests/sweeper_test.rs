//! Reconciliation sweep: bulk transition, job cleanup, races with timers.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, TimeZone, Utc};
use duewatch::clock::{Clock, ManualClock};
use duewatch::engine::{DueDateScheduler, SweepConfig, SweepReport, Sweeper};
use duewatch::event::{Event, EventBus, EventKind};
use duewatch::lifecycle;
use duewatch::model::*;
use duewatch::store::{ItemStore, MemoryStore};
use tokio::sync::broadcast;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 14, 12, 0, 0).unwrap()
}

struct Harness {
    store: Arc<MemoryStore>,
    clock: Arc<ManualClock>,
    scheduler: DueDateScheduler,
    sweeper: Arc<Sweeper>,
    events: broadcast::Receiver<Event>,
}

fn harness(scheduler_enabled: bool, config: SweepConfig) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(t0()));
    let bus = EventBus::new();
    let events = bus.subscribe();
    let (scheduler, _) =
        DueDateScheduler::start(store.clone(), clock.clone(), bus.clone(), scheduler_enabled);
    let sweeper = Arc::new(Sweeper::new(
        store.clone(),
        scheduler.clone(),
        clock.clone(),
        bus,
        config,
    ));
    Harness {
        store,
        clock,
        scheduler,
        sweeper,
        events,
    }
}

fn every_minute() -> SweepConfig {
    SweepConfig {
        interval: StdDuration::from_secs(60),
        initial_delay: StdDuration::ZERO,
    }
}

async fn pending_item(store: &MemoryStore, clock: &dyn Clock, due_in: Duration) -> Item {
    let now = clock.now();
    let item = lifecycle::validate_new(NewItem::new("task", now + due_in), now).unwrap();
    store.create(&item).await.unwrap();
    item
}

fn drain(events: &mut broadcast::Receiver<Event>) -> Vec<EventKind> {
    let mut kinds = Vec::new();
    while let Ok(event) = events.try_recv() {
        kinds.push(event.kind);
    }
    kinds
}

// ---------------------------------------------------------------------------
// Single sweeps
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn sweep_marks_past_due_item_overdue_with_scheduler_disabled() {
    let h = harness(false, every_minute());
    let item = pending_item(&h.store, &*h.clock, -Duration::hours(1)).await;

    let report = h.sweeper.sweep_once().await.unwrap();
    assert_eq!(report.count, 1);
    assert_eq!(report.ids, vec![item.id]);

    let stored = h.store.get(item.id).await.unwrap();
    assert_eq!(stored.status, Status::Overdue);
    stored.check_invariants().unwrap();
}

#[tokio::test(start_paused = true)]
async fn repeated_sweeps_do_not_double_count() {
    let h = harness(false, every_minute());
    pending_item(&h.store, &*h.clock, -Duration::minutes(5)).await;
    pending_item(&h.store, &*h.clock, -Duration::seconds(1)).await;

    assert_eq!(h.sweeper.sweep_once().await.unwrap().count, 2);
    assert_eq!(h.sweeper.sweep_once().await.unwrap(), SweepReport::default());
    assert_eq!(h.store.list(Some(Status::Overdue)).await.unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn sweep_ignores_future_and_finished_items() {
    let h = harness(false, every_minute());
    let future = pending_item(&h.store, &*h.clock, Duration::hours(1)).await;
    let mut done = pending_item(&h.store, &*h.clock, -Duration::hours(1)).await;
    done.status = Status::Completed;
    done.completed_date = Some(t0());
    h.store.put(done.clone());

    assert_eq!(h.sweeper.sweep_once().await.unwrap().count, 0);
    assert_eq!(h.store.get(future.id).await.unwrap().status, Status::Pending);
    assert_eq!(h.store.get(done.id).await.unwrap().status, Status::Completed);
}

#[tokio::test(start_paused = true)]
async fn sweep_cancels_timers_of_transitioned_items() {
    let mut h = harness(true, every_minute());
    let item = pending_item(&h.store, &*h.clock, Duration::hours(1)).await;
    h.scheduler.arm(&item);
    assert_eq!(h.scheduler.armed_count().await.unwrap(), 1);

    // Wall clock jumps past the due date before the timer gets to run.
    h.clock.advance(Duration::hours(2));
    let report = h.sweeper.sweep_once().await.unwrap();
    assert_eq!(report.ids, vec![item.id]);

    assert_eq!(h.scheduler.armed_count().await.unwrap(), 0);
    let job = h.scheduler.job(item.id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Cancelled);

    let kinds = drain(&mut h.events);
    assert!(kinds.contains(&EventKind::SweepCompleted {
        ids: vec![item.id]
    }));
    assert!(!kinds.iter().any(|k| matches!(k, EventKind::JobFired { .. })));
}

#[tokio::test(start_paused = true)]
async fn timer_and_sweep_race_applies_transition_once() {
    let mut h = harness(true, every_minute());
    let items = [
        pending_item(&h.store, &*h.clock, -Duration::seconds(30)).await,
        pending_item(&h.store, &*h.clock, -Duration::seconds(10)).await,
        pending_item(&h.store, &*h.clock, Duration::zero()).await,
    ];
    for item in &items {
        h.scheduler.arm(item);
    }

    let sweeper = Arc::clone(&h.sweeper);
    let (report, _) = tokio::join!(
        async move { sweeper.sweep_once().await },
        tokio::time::sleep(StdDuration::from_millis(10)),
    );
    let report = report.unwrap();
    tokio::time::sleep(StdDuration::from_millis(10)).await;

    let kinds = drain(&mut h.events);
    for item in &items {
        assert_eq!(h.store.get(item.id).await.unwrap().status, Status::Overdue);
        let by_timer = kinds
            .iter()
            .filter(|k| **k == EventKind::JobFired { id: item.id })
            .count();
        let by_sweep = report.ids.iter().filter(|id| **id == item.id).count();
        assert_eq!(by_timer + by_sweep, 1, "item {} transitioned twice", item.id);
    }
}

// ---------------------------------------------------------------------------
// Loop
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn run_loop_sweeps_on_interval_until_shutdown() {
    let config = SweepConfig {
        interval: StdDuration::from_secs(60),
        initial_delay: StdDuration::from_secs(5),
    };
    let mut h = harness(false, config);
    let first = pending_item(&h.store, &*h.clock, -Duration::hours(1)).await;

    let sweeper = Arc::clone(&h.sweeper);
    let task = tokio::spawn(async move { sweeper.run().await });

    tokio::time::sleep(StdDuration::from_secs(1)).await;
    assert_eq!(h.store.get(first.id).await.unwrap().status, Status::Pending);

    tokio::time::sleep(StdDuration::from_secs(5)).await;
    assert_eq!(h.store.get(first.id).await.unwrap().status, Status::Overdue);

    // Created after the first sweep; caught by the next one.
    let second = pending_item(&h.store, &*h.clock, -Duration::minutes(1)).await;
    tokio::time::sleep(StdDuration::from_secs(61)).await;
    assert_eq!(h.store.get(second.id).await.unwrap().status, Status::Overdue);

    h.sweeper.shutdown();
    task.await.unwrap();

    let sweeps = drain(&mut h.events)
        .into_iter()
        .filter(|k| matches!(k, EventKind::SweepCompleted { .. }))
        .count();
    assert_eq!(sweeps, 2);
}
