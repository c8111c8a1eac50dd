//! Due-date engine: scheduler, sweeper, and the wiring that owns them.
//!
//! Nothing here is global. [`Engine::start`] builds every component from
//! the store, clock and config it is given, so tests can run isolated
//! engines side by side.

pub mod scheduler;
pub mod sweeper;

pub use scheduler::DueDateScheduler;
pub use sweeper::{SweepConfig, SweepReport, Sweeper};

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::event::{Event, EventBus};
use crate::model::Status;
use crate::service::ItemService;
use crate::store::ItemStore;

pub struct Engine {
    store: Arc<dyn ItemStore>,
    scheduler: DueDateScheduler,
    sweeper: Arc<Sweeper>,
    service: ItemService,
    events: EventBus,
    tasks: Vec<JoinHandle<()>>,
}

impl Engine {
    /// Start the scheduler actor and the sweep loop on the current runtime.
    pub fn start(store: Arc<dyn ItemStore>, clock: Arc<dyn Clock>, config: &EngineConfig) -> Self {
        let events = EventBus::new();
        let (scheduler, scheduler_task) = DueDateScheduler::start(
            Arc::clone(&store),
            Arc::clone(&clock),
            events.clone(),
            config.scheduler_enabled,
        );
        let sweeper = Arc::new(Sweeper::new(
            Arc::clone(&store),
            scheduler.clone(),
            Arc::clone(&clock),
            events.clone(),
            SweepConfig::from(config),
        ));
        let sweeper_task = {
            let sweeper = Arc::clone(&sweeper);
            tokio::spawn(async move { sweeper.run().await })
        };
        let service = ItemService::new(Arc::clone(&store), scheduler.clone(), clock);

        Self {
            store,
            scheduler,
            sweeper,
            service,
            events,
            tasks: vec![scheduler_task, sweeper_task],
        }
    }

    /// Re-arm timers for every pending item. Timers do not survive a
    /// restart; without this, items due later than the next sweep would
    /// wait up to one extra interval.
    pub async fn recover(&self) -> Result<usize> {
        let pending = self.store.list(Some(Status::Pending)).await?;
        for item in &pending {
            self.scheduler.arm(item);
        }
        info!(count = pending.len(), "re-armed pending items");
        Ok(pending.len())
    }

    pub fn items(&self) -> &ItemService {
        &self.service
    }

    pub fn scheduler(&self) -> &DueDateScheduler {
        &self.scheduler
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Stop the sweep loop and the scheduler, and wait for both to exit.
    pub async fn shutdown(self) {
        self.sweeper.shutdown();
        self.scheduler.shutdown();
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!("engine task ended abnormally: {e}");
            }
        }
        info!("engine stopped");
    }
}
