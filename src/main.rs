//! Sign Station Server
//!
//! Serves the NFT and gallery routes and runs the payout dispatcher in the
//! background.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use sign_station::{
    notify, Config, HttpLedgerClient, MemoryStore, RedisStore, Station, Store,
};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sign-station-server")]
#[command(version)]
#[command(about = "Sign Station - wallet sign requests and airdrop payouts")]
struct Args {
    /// Configuration file (the embedded default is used if it is missing)
    #[arg(short, long, env = "STATION_CONFIG", default_value = "config.toml")]
    config: PathBuf,

    /// Keep all state in process memory (development only)
    #[arg(long)]
    memory: bool,

    /// Do not start the payout dispatcher (when it runs as `station scheduler`)
    #[arg(long)]
    no_dispatcher: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    info!("Starting Sign Station Server");

    let mut config = Config::load_from(&args.config)?;
    config.apply_env();

    let store: Arc<dyn Store> = if args.memory {
        warn!("Using in-memory store - state is lost on exit");
        Arc::new(MemoryStore::new())
    } else {
        let store = RedisStore::connect(&config.store.url)
            .await
            .context("Failed to connect to the key-value store")?;
        Arc::new(store)
    };

    if config.ledger.project_secret_key.is_empty() {
        warn!("PROJECT_SECRET_KEY not set - the relay will refuse pairing sessions");
    }

    let ledger = Arc::new(HttpLedgerClient::new(&config.ledger));
    let notifier = notify::from_config(&config.notify);
    let station = Arc::new(Station::new(&config, store, ledger, notifier));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let dispatcher_task = if args.no_dispatcher {
        info!("Payout dispatcher disabled");
        None
    } else {
        let dispatcher = station.dispatcher.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = dispatcher.recover_unconfirmed().await {
                error!("Failed to check in-flight payouts: {}", e);
            }
            dispatcher.run(shutdown_rx).await;
        }))
    };

    sign_station::server::run_server(&config.server, station, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
        }
        info!("Shutdown requested");
    })
    .await?;

    // The dispatcher finishes its current payout before stopping.
    let _ = shutdown_tx.send(true);
    if let Some(task) = dispatcher_task {
        if let Err(e) = task.await {
            error!("Payout dispatcher task failed: {}", e);
        }
    }

    Ok(())
}
