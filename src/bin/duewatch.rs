//! duewatch CLI: run the due-date engine and manage items.

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use duewatch::clock::{Clock, SystemClock};
use duewatch::config::Config;
use duewatch::db::Db;
use duewatch::engine::{DueDateScheduler, Engine, SweepConfig, Sweeper};
use duewatch::event::EventBus;
use duewatch::model::{Item, ItemId, ItemPatch, NewItem, Status};
use duewatch::service::ItemService;
use duewatch::store::ItemStore;
use duewatch::telemetry::{TelemetryConfig, init_telemetry};
use secrecy::ExposeSecret;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "duewatch", about = "Due-date lifecycle engine")]
struct Cli {
    /// TOML file with engine settings (env vars override it)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler and sweeper until Ctrl-C
    Serve,
    /// Run one reconciliation sweep and exit
    Sweep,
    /// Item operations
    ///
    /// These commands write to the database and exit without arming timers.
    /// A running `serve` moves their items to overdue on its next sweep
    /// (SWEEP_INTERVAL_SECS, default 300), so expect up to one interval of
    /// delay past the due date.
    Item {
        #[command(subcommand)]
        action: ItemAction,
    },
}

#[derive(Subcommand)]
enum ItemAction {
    /// Create an item
    Create {
        description: String,
        /// Due date (RFC 3339)
        #[arg(long, conflicts_with = "due_in", required_unless_present = "due_in")]
        due: Option<DateTime<Utc>>,
        /// Due date as seconds from now
        #[arg(long)]
        due_in: Option<i64>,
        /// Initial status (pending or completed)
        #[arg(long)]
        status: Option<Status>,
    },
    /// List items
    List {
        /// Filter by status
        #[arg(long)]
        status: Option<Status>,
    },
    /// Show an item as JSON
    Show { id: ItemId },
    /// Update an item
    Update {
        id: ItemId,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        status: Option<Status>,
        /// New due date (RFC 3339)
        #[arg(long)]
        due: Option<DateTime<Utc>>,
        /// Completed date (RFC 3339)
        #[arg(long)]
        completed: Option<DateTime<Utc>>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "duewatch".to_string(),
        log_level: config.log_level.clone(),
    })?;

    let db = Db::connect(config.database_url.expose_secret()).await?;
    db.migrate().await?;
    let store: Arc<dyn ItemStore> = Arc::new(db);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    match cli.command {
        Command::Serve => cmd_serve(store, clock, &config).await,
        Command::Sweep => cmd_sweep(store, clock, &config).await,
        Command::Item { action } => {
            // One-shot commands never install timers. See the `item` help.
            let (scheduler, _) =
                DueDateScheduler::start(Arc::clone(&store), Arc::clone(&clock), EventBus::new(), false);
            let service = ItemService::new(store, scheduler, clock);
            cmd_item(&service, action).await
        }
    }
}

async fn cmd_serve(
    store: Arc<dyn ItemStore>,
    clock: Arc<dyn Clock>,
    config: &Config,
) -> anyhow::Result<()> {
    let engine = Engine::start(store, clock, &config.engine);
    engine.recover().await?;

    tokio::signal::ctrl_c().await?;
    engine.shutdown().await;
    Ok(())
}

async fn cmd_sweep(
    store: Arc<dyn ItemStore>,
    clock: Arc<dyn Clock>,
    config: &Config,
) -> anyhow::Result<()> {
    let events = EventBus::new();
    let (scheduler, _) =
        DueDateScheduler::start(Arc::clone(&store), Arc::clone(&clock), events.clone(), false);
    let sweeper = Sweeper::new(
        store,
        scheduler,
        clock,
        events,
        SweepConfig::from(&config.engine),
    );
    let report = sweeper.sweep_once().await?;

    println!("{} item(s) moved to overdue", report.count);
    for id in &report.ids {
        println!("  {id}");
    }
    Ok(())
}

async fn cmd_item(service: &ItemService, action: ItemAction) -> anyhow::Result<()> {
    match action {
        ItemAction::Create {
            description,
            due,
            due_in,
            status,
        } => {
            let due_date = match (due, due_in) {
                (Some(due), _) => due,
                (None, Some(secs)) => Utc::now() + chrono::Duration::seconds(secs),
                (None, None) => anyhow::bail!("either --due or --due-in is required"),
            };
            let mut new = NewItem::new(description, due_date);
            if let Some(status) = status {
                new = new.status(status);
            }
            let item = service.create(new).await?;
            println!("Created: {} (status: {}, due: {})", item.id, item.status, item.due_date);
        }
        ItemAction::List { status } => {
            let items = service.list(status).await?;
            print_items(&items);
        }
        ItemAction::Show { id } => {
            let item = service.get(id).await?;
            println!("{}", serde_json::to_string_pretty(&item)?);
        }
        ItemAction::Update {
            id,
            description,
            status,
            due,
            completed,
        } => {
            let patch = ItemPatch {
                description,
                status,
                due_date: due,
                completed_date: completed,
            };
            let item = service.update(id, patch).await?;
            println!("Updated: {} (status: {})", item.id, item.status);
        }
    }
    Ok(())
}

fn print_items(items: &[Item]) {
    if items.is_empty() {
        println!("No items found.");
        return;
    }

    println!(
        "{:<36}  {:<10}  {:<16}  {:<16}  DESCRIPTION",
        "ID", "STATUS", "DUE", "COMPLETED"
    );
    println!("{}", "-".repeat(110));

    for item in items {
        let completed = item
            .completed_date
            .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        let description: String = item.description.chars().take(40).collect();
        println!(
            "{:<36}  {:<10}  {:<16}  {:<16}  {}",
            item.id,
            item.status,
            item.due_date.format("%Y-%m-%d %H:%M"),
            completed,
            description
        );
    }

    println!("\n{} item(s)", items.len());
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn item_help_states_sweep_latency() {
        let mut cli = Cli::command();
        let item = cli.find_subcommand_mut("item").expect("item subcommand");
        let help = item.render_long_help().to_string();
        assert!(help.contains("next sweep"), "{help}");
        assert!(help.contains("SWEEP_INTERVAL_SECS"), "{help}");
    }

    #[test]
    fn create_requires_a_due_date() {
        assert!(Cli::try_parse_from(["duewatch", "item", "create", "task"]).is_err());
        assert!(
            Cli::try_parse_from(["duewatch", "item", "create", "task", "--due-in", "60"]).is_ok()
        );
    }
}
