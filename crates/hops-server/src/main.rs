//! hops server
//!
//! Runs the sequence runner, the schedule timers, the automations watcher and
//! the HTTP API against an in-process broker.
//!
//! ```text
//! hops [CONFIG_DIR] [TAG]
//! ```

use anyhow::{Context, Result};
use hops_api::AppState;
use hops_broker::{Client, MemoryJetStream, MemoryObjectStore};
use hops_config::HopsConfig;
use hops_runner::{AutomationsLoader, ReloadController, Runner, Scheduler};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let config_dir = PathBuf::from(args.next().unwrap_or_else(|| ".".to_string()));
    let tag = args.next();

    let config = HopsConfig::load(&config_dir, tag.as_deref())
        .with_context(|| format!("loading config from {}", config_dir.display()))?;

    // RUST_LOG wins over the dev default
    let default_level = if config.dev { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!(account_id = %config.runner.account_id, "Starting hops");

    let client = Client::new(
        Arc::new(MemoryJetStream::new()),
        Arc::new(MemoryObjectStore::new()),
        config.runner.account_id.clone(),
    )
    .with_bundle_timeout(config.runner.bundle_timeout());

    let automations_dir = config.automations_dir(&config_dir);
    let loader = match AutomationsLoader::new(
        &automations_dir,
        client.clone(),
        config.runner.config_cache_ttl(),
    )
    .await
    {
        Ok(loader) => Arc::new(loader),
        Err(e) => {
            let report = hops_dsl::validate_dir(&automations_dir);
            error!(
                "Automations failed to load:\n{}",
                serde_json::to_string_pretty(&report).unwrap_or_default()
            );
            return Err(e).with_context(|| format!("loading automations from {}", automations_dir.display()));
        }
    };

    let scheduler = Arc::new(Scheduler::new(client.clone()));
    scheduler.start(&loader.current());

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let mut tasks = tokio::task::JoinSet::new();

    let runner = Arc::new(Runner::new(loader.clone(), client.clone()));
    let runner_shutdown = shutdown_tx.subscribe();
    let grace = config.runner.shutdown_grace();
    tasks.spawn(async move {
        if let Err(e) = runner.run(runner_shutdown, grace).await {
            error!("Runner stopped: {}", e);
        }
    });

    if config.runner.watch {
        let controller = ReloadController::new(loader.clone(), scheduler.clone(), config.runner.reload_debounce());
        let reload_shutdown = shutdown_tx.subscribe();
        tasks.spawn(async move {
            if let Err(e) = controller.run(reload_shutdown).await {
                error!("Automations watcher stopped: {}", e);
            }
        });
    }

    if config.http.enabled {
        let state = AppState::new(client.clone(), loader.clone());
        let addr = config.http.addr;
        let http_shutdown = shutdown_tx.subscribe();
        tasks.spawn(async move {
            if let Err(e) = hops_api::start_server(state, addr, http_shutdown).await {
                error!("API server stopped: {}", e);
            }
        });
    }

    info!("hops is running");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    let _ = shutdown_tx.send(());
    scheduler.stop();
    while tasks.join_next().await.is_some() {}

    Ok(())
}
