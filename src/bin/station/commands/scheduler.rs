//! Scheduler command - run the payout dispatcher on its own

use anyhow::{Context, Result};
use sign_station::{notify, Config, HttpLedgerClient, RedisStore, Station};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

pub async fn run(path: &Path) -> Result<()> {
    let mut config = Config::load_from(path)?;
    config.apply_env();

    let store = RedisStore::connect(&config.store.url)
        .await
        .context("Failed to connect to the key-value store")?;
    let ledger = Arc::new(HttpLedgerClient::new(&config.ledger));
    let notifier = notify::from_config(&config.notify);
    let station = Station::new(&config, Arc::new(store), ledger, notifier);
    let dispatcher = station.dispatcher.clone();

    let parked = dispatcher.recover_unconfirmed().await?;
    if parked > 0 {
        info!("{} payouts need manual reconciliation", parked);
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            return;
        }
        info!("Shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    dispatcher.run(shutdown_rx).await;
    Ok(())
}
