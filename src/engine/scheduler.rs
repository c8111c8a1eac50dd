//! Per-item due-date timers.
//!
//! A single actor task owns the job table. Callers hold a cloneable
//! [`DueDateScheduler`] handle and talk to the actor over a channel. Each
//! armed job is a sleeping task that, when its delay elapses, sends a
//! `Fired { id, generation }` message back to the actor; it never touches
//! the job table or the store itself. The actor then runs the firing check
//! against the store on a separate task and records the result when it
//! settles.
//!
//! Every arm bumps a generation counter. Messages from a superseded
//! generation are ignored, so the last arm for an item always wins.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, warn};

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::event::{CancelReason, EventBus, EventKind};
use crate::model::{Item, ItemId, JobState, ScheduledJob, Status};
use crate::store::{Guard, ItemStore};
use crate::telemetry::item::{record_fire_outcome, start_fire_span};
use crate::telemetry::metrics;

/// Terminal jobs kept for [`DueDateScheduler::job`] lookups.
const HISTORY_LEN: usize = 256;

enum Command {
    Arm {
        id: ItemId,
        due_date: DateTime<Utc>,
    },
    Cancel {
        id: ItemId,
    },
    Fired {
        id: ItemId,
        generation: u64,
    },
    Settled {
        id: ItemId,
        generation: u64,
        outcome: FireOutcome,
    },
    Job {
        id: ItemId,
        reply: oneshot::Sender<Option<ScheduledJob>>,
    },
    ArmedCount {
        reply: oneshot::Sender<usize>,
    },
    Shutdown,
}

#[derive(Debug, Clone)]
enum FireOutcome {
    Fired,
    /// The timer ran ahead of the engine clock. The job stays armed.
    NotYetDue,
    Cancelled(CancelReason),
    Failed(String),
}

/// Handle to the scheduler actor. Cheap to clone.
#[derive(Debug, Clone)]
pub struct DueDateScheduler {
    tx: mpsc::UnboundedSender<Command>,
}

impl DueDateScheduler {
    /// Spawn the scheduler actor on the current tokio runtime.
    ///
    /// With `enabled = false` the scheduler accepts every call but never
    /// installs a timer, leaving reconciliation to the sweeper.
    pub fn start(
        store: Arc<dyn ItemStore>,
        clock: Arc<dyn Clock>,
        events: EventBus,
        enabled: bool,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let actor = Actor {
            store,
            clock,
            events,
            enabled,
            jobs: HashMap::new(),
            history: VecDeque::new(),
            next_generation: 0,
            rx,
            tx: tx.downgrade(),
        };
        let handle = tokio::spawn(actor.run());
        (Self { tx }, handle)
    }

    /// Install or replace the timer for `item`, firing at its due date (or
    /// immediately if already due). Failures are logged, not returned.
    pub fn arm(&self, item: &Item) {
        if let Err(e) = self.try_arm(item.id, item.due_date) {
            warn!(id = %item.id, "failed to arm due-date job: {e}");
        }
    }

    pub fn try_arm(&self, id: ItemId, due_date: DateTime<Utc>) -> Result<()> {
        self.send(Command::Arm { id, due_date })
    }

    /// Cancel the job for `id` if one is armed. Failures are logged, not
    /// returned.
    pub fn cancel(&self, id: ItemId) {
        if let Err(e) = self.try_cancel(id) {
            warn!(%id, "failed to cancel due-date job: {e}");
        }
    }

    pub fn try_cancel(&self, id: ItemId) -> Result<()> {
        self.send(Command::Cancel { id })
    }

    /// Hook for the create path. Only pending items get a timer.
    pub fn on_item_created(&self, item: &Item) {
        if item.status == Status::Pending {
            self.arm(item);
        }
    }

    /// Hook for the update path when a pending item's due date changed.
    pub fn on_due_date_changed(&self, item: &Item) {
        if item.status == Status::Pending {
            self.arm(item);
        } else {
            self.cancel(item.id);
        }
    }

    /// The live job for `id`, or the most recent terminal one.
    pub async fn job(&self, id: ItemId) -> Result<Option<ScheduledJob>> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Job { id, reply })?;
        rx.await
            .map_err(|_| Error::Scheduling("scheduler stopped".to_string()))
    }

    /// Number of jobs currently armed.
    pub async fn armed_count(&self) -> Result<usize> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::ArmedCount { reply })?;
        rx.await
            .map_err(|_| Error::Scheduling("scheduler stopped".to_string()))
    }

    /// Stop the actor and abort every pending timer.
    pub fn shutdown(&self) {
        let _ = self.send(Command::Shutdown);
    }

    fn send(&self, command: Command) -> Result<()> {
        self.tx
            .send(command)
            .map_err(|_| Error::Scheduling("scheduler is not running".to_string()))
    }
}

struct Entry {
    job: ScheduledJob,
    timer: Option<JoinHandle<()>>,
    /// Shared with an in-flight firing so a late cancel can still stop it
    /// before the store write.
    cancelled: Arc<AtomicBool>,
    in_flight: bool,
}

impl Entry {
    fn stop(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

struct Actor {
    store: Arc<dyn ItemStore>,
    clock: Arc<dyn Clock>,
    events: EventBus,
    enabled: bool,
    jobs: HashMap<ItemId, Entry>,
    history: VecDeque<ScheduledJob>,
    next_generation: u64,
    rx: mpsc::UnboundedReceiver<Command>,
    /// Timers and firings hold this weakly so dropping every handle stops
    /// the actor.
    tx: mpsc::WeakUnboundedSender<Command>,
}

impl Actor {
    async fn run(mut self) {
        debug!(enabled = self.enabled, "due-date scheduler started");
        while let Some(command) = self.rx.recv().await {
            match command {
                Command::Arm { id, due_date } => self.arm(id, due_date),
                Command::Cancel { id } => self.cancel(id),
                Command::Fired { id, generation } => self.fire(id, generation),
                Command::Settled {
                    id,
                    generation,
                    outcome,
                } => self.settle(id, generation, outcome),
                Command::Job { id, reply } => {
                    let _ = reply.send(self.lookup(id));
                }
                Command::ArmedCount { reply } => {
                    let _ = reply.send(self.jobs.len());
                }
                Command::Shutdown => break,
            }
        }
        for entry in self.jobs.values_mut() {
            entry.stop();
        }
        debug!(abandoned = self.jobs.len(), "due-date scheduler stopped");
    }

    fn arm(&mut self, id: ItemId, due_date: DateTime<Utc>) {
        if !self.enabled {
            debug!(%id, "scheduler disabled, not arming");
            return;
        }
        if let Some(existing) = self.jobs.get(&id)
            && existing.job.fire_at == due_date
            && !existing.in_flight
        {
            return;
        }
        if let Some(mut previous) = self.jobs.remove(&id) {
            previous.stop();
            self.finish(previous.job, JobState::Cancelled);
            self.report_cancelled(id, CancelReason::Superseded);
        }

        self.next_generation += 1;
        let generation = self.next_generation;
        let delay = self.delay_until(due_date);
        let timer = self.spawn_timer(id, generation, delay);

        let job = ScheduledJob {
            item_id: id,
            fire_at: due_date,
            state: JobState::Armed,
            generation,
        };
        self.jobs.insert(
            id,
            Entry {
                job,
                timer: Some(timer),
                cancelled: Arc::new(AtomicBool::new(false)),
                in_flight: false,
            },
        );

        info!(%id, fire_at = %due_date, delay_ms = delay.as_millis() as u64, "due-date job armed");
        metrics::job_events().add(1, &[KeyValue::new("state", "armed")]);
        self.events.emit(
            self.clock.now(),
            EventKind::JobArmed {
                id,
                fire_at: due_date,
            },
        );
    }

    fn cancel(&mut self, id: ItemId) {
        let Some(mut entry) = self.jobs.remove(&id) else {
            return;
        };
        entry.stop();
        self.finish(entry.job, JobState::Cancelled);
        self.report_cancelled(id, CancelReason::Requested);
    }

    fn fire(&mut self, id: ItemId, generation: u64) {
        let Some(entry) = self.jobs.get_mut(&id) else {
            return;
        };
        if entry.job.generation != generation || entry.in_flight {
            return;
        }
        entry.in_flight = true;
        entry.timer = None;

        let store = Arc::clone(&self.store);
        let clock = Arc::clone(&self.clock);
        let cancelled = Arc::clone(&entry.cancelled);
        let fire_at = entry.job.fire_at;
        let tx = self.tx.clone();
        let span = start_fire_span(id, generation);

        tokio::spawn(
            async move {
                let outcome = check_and_transition(store, clock, id, fire_at, cancelled).await;
                let label = match &outcome {
                    FireOutcome::Fired => "fired".to_string(),
                    FireOutcome::NotYetDue => "not_yet_due".to_string(),
                    FireOutcome::Cancelled(reason) => reason.to_string(),
                    FireOutcome::Failed(_) => "failed".to_string(),
                };
                record_fire_outcome(&tracing::Span::current(), &label);
                if let Some(tx) = tx.upgrade() {
                    let _ = tx.send(Command::Settled {
                        id,
                        generation,
                        outcome,
                    });
                }
            }
            .instrument(span),
        );
    }

    fn settle(&mut self, id: ItemId, generation: u64, outcome: FireOutcome) {
        // Still the current job? Otherwise it was cancelled or superseded
        // mid-flight and that has already been reported.
        let current = self
            .jobs
            .get(&id)
            .is_some_and(|entry| entry.job.generation == generation);

        match outcome {
            FireOutcome::Fired => {
                info!(%id, "item is overdue, status updated by timer");
                metrics::job_events().add(1, &[KeyValue::new("state", "fired")]);
                metrics::record_transition(Status::Pending, Status::Overdue, 1);
                self.events
                    .emit(self.clock.now(), EventKind::JobFired { id });
                if current {
                    if let Some(entry) = self.jobs.remove(&id) {
                        self.finish(entry.job, JobState::Fired);
                    }
                } else {
                    self.amend_history(id, generation, JobState::Fired);
                }
            }
            FireOutcome::NotYetDue => {
                if !current {
                    return;
                }
                let Some(fire_at) = self.jobs.get(&id).map(|entry| entry.job.fire_at) else {
                    return;
                };
                let delay = self.delay_until(fire_at);
                let timer = self.spawn_timer(id, generation, delay);
                if let Some(entry) = self.jobs.get_mut(&id) {
                    entry.in_flight = false;
                    entry.timer = Some(timer);
                }
                debug!(%id, delay_ms = delay.as_millis() as u64, "timer ran early, re-armed");
            }
            FireOutcome::Cancelled(reason) => {
                if current {
                    if let Some(entry) = self.jobs.remove(&id) {
                        self.finish(entry.job, JobState::Cancelled);
                    }
                    self.report_cancelled(id, reason);
                }
            }
            FireOutcome::Failed(error) => {
                // The next sweep picks the item up.
                warn!(%id, "due-date job failed to update item: {error}");
                if current {
                    if let Some(entry) = self.jobs.remove(&id) {
                        self.finish(entry.job, JobState::Cancelled);
                    }
                    self.report_cancelled(id, CancelReason::StoreError);
                }
            }
        }
    }

    /// Time left until `at` by the engine clock, zero if already past.
    fn delay_until(&self, at: DateTime<Utc>) -> Duration {
        (at - self.clock.now()).to_std().unwrap_or(Duration::ZERO)
    }

    fn spawn_timer(&self, id: ItemId, generation: u64, delay: Duration) -> JoinHandle<()> {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(Command::Fired { id, generation });
            }
        })
    }

    fn lookup(&self, id: ItemId) -> Option<ScheduledJob> {
        self.jobs.get(&id).map(|entry| entry.job).or_else(|| {
            self.history
                .iter()
                .rev()
                .find(|job| job.item_id == id)
                .copied()
        })
    }

    fn finish(&mut self, mut job: ScheduledJob, state: JobState) {
        job.state = state;
        if self.history.len() == HISTORY_LEN {
            self.history.pop_front();
        }
        self.history.push_back(job);
    }

    fn amend_history(&mut self, id: ItemId, generation: u64, state: JobState) {
        if let Some(job) = self
            .history
            .iter_mut()
            .rev()
            .find(|job| job.item_id == id && job.generation == generation)
        {
            job.state = state;
        }
    }

    fn report_cancelled(&self, id: ItemId, reason: CancelReason) {
        debug!(%id, %reason, "due-date job cancelled");
        metrics::job_events().add(
            1,
            &[
                KeyValue::new("state", "cancelled"),
                KeyValue::new("reason", reason.to_string()),
            ],
        );
        self.events
            .emit(self.clock.now(), EventKind::JobCancelled { id, reason });
    }
}

/// The firing protocol. Any mismatch between what the job was armed for and
/// what the store holds now means the job is stale and does nothing.
///
/// Timers sleep on tokio's monotonic clock, which can drift from the engine
/// clock. The item only becomes overdue once the engine clock agrees.
async fn check_and_transition(
    store: Arc<dyn ItemStore>,
    clock: Arc<dyn Clock>,
    id: ItemId,
    fire_at: DateTime<Utc>,
    cancelled: Arc<AtomicBool>,
) -> FireOutcome {
    if clock.now() < fire_at {
        return FireOutcome::NotYetDue;
    }
    let item = match store.get(id).await {
        Ok(item) => item,
        Err(Error::NotFound(_)) => return FireOutcome::Cancelled(CancelReason::ItemMissing),
        Err(e) => return FireOutcome::Failed(e.to_string()),
    };
    if item.status != Status::Pending {
        return FireOutcome::Cancelled(CancelReason::NotPending);
    }
    if item.due_date != fire_at {
        return FireOutcome::Cancelled(CancelReason::DueDateChanged);
    }
    if cancelled.load(Ordering::SeqCst) {
        return FireOutcome::Cancelled(CancelReason::Requested);
    }

    let guard = Guard::status(Status::Pending).due_on(fire_at);
    match store
        .transition_if(id, guard, Status::Overdue, clock.now())
        .await
    {
        Ok(true) => FireOutcome::Fired,
        Ok(false) => FireOutcome::Cancelled(CancelReason::LostRace),
        Err(e) => FireOutcome::Failed(e.to_string()),
    }
}
