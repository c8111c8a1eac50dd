//! Reconciliation sweep: the correctness backstop for the timer path.
//!
//! Timers live only in memory and are lost on restart. On a fixed delay the
//! sweeper asks the store to move every pending item whose due date has
//! passed to overdue in one bulk write, then cancels the now-redundant
//! timers for those items.

use std::sync::Arc;
use std::time::{Duration, Instant};

use opentelemetry::KeyValue;
use tokio::sync::Notify;
use tracing::{Instrument, error, info, warn};

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::event::{EventBus, EventKind};
use crate::model::{ItemId, Status};
use crate::store::ItemStore;
use crate::telemetry::item::{record_sweep_count, start_sweep_span};
use crate::telemetry::metrics;

use super::scheduler::DueDateScheduler;

/// Timing for the sweep loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepConfig {
    /// Delay between the end of one sweep and the start of the next.
    pub interval: Duration,
    /// Delay before the first sweep.
    pub initial_delay: Duration,
}

impl From<&EngineConfig> for SweepConfig {
    fn from(config: &EngineConfig) -> Self {
        Self {
            interval: config.sweep_interval,
            initial_delay: config.initial_sweep_delay,
        }
    }
}

/// What one sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub count: usize,
    pub ids: Vec<ItemId>,
}

pub struct Sweeper {
    store: Arc<dyn ItemStore>,
    scheduler: DueDateScheduler,
    clock: Arc<dyn Clock>,
    events: EventBus,
    config: SweepConfig,
    shutdown: Arc<Notify>,
}

impl Sweeper {
    pub fn new(
        store: Arc<dyn ItemStore>,
        scheduler: DueDateScheduler,
        clock: Arc<dyn Clock>,
        events: EventBus,
        config: SweepConfig,
    ) -> Self {
        Self {
            store,
            scheduler,
            clock,
            events,
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Signal the sweep loop to stop.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    /// Run sweeps until shutdown. A failed sweep is logged and retried on
    /// the next cycle.
    pub async fn run(&self) {
        info!(
            interval_secs = self.config.interval.as_secs_f64(),
            initial_delay_secs = self.config.initial_delay.as_secs_f64(),
            "sweeper started"
        );

        let mut delay = self.config.initial_delay;
        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("sweeper shutting down");
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            if let Err(e) = self.sweep_once().await {
                error!("sweep failed: {e}");
            }
            delay = self.config.interval;
        }
    }

    /// Run one sweep now.
    pub async fn sweep_once(&self) -> Result<SweepReport> {
        let span = start_sweep_span();
        async {
            let started = Instant::now();
            info!("sweep started");

            let now = self.clock.now();
            let ids = match self.store.transition_due(now, Status::Overdue).await {
                Ok(ids) => ids,
                Err(e) => {
                    metrics::sweep_duration_ms().record(
                        started.elapsed().as_secs_f64() * 1000.0,
                        &[KeyValue::new("result", "error")],
                    );
                    return Err(e);
                }
            };

            for id in &ids {
                if let Err(e) = self.scheduler.try_cancel(*id) {
                    warn!(%id, "failed to cancel job after sweep: {e}");
                }
            }

            record_sweep_count(&tracing::Span::current(), ids.len());
            metrics::sweep_items().add(ids.len() as u64, &[]);
            metrics::record_transition(Status::Pending, Status::Overdue, ids.len() as u64);
            metrics::sweep_duration_ms().record(
                started.elapsed().as_secs_f64() * 1000.0,
                &[KeyValue::new("result", "ok")],
            );
            self.events
                .emit(now, EventKind::SweepCompleted { ids: ids.clone() });
            info!(count = ids.len(), "sweep ended");

            Ok(SweepReport {
                count: ids.len(),
                ids,
            })
        }
        .instrument(span)
        .await
    }
}
