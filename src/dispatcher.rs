//! Payout dispatcher
//!
//! Single background worker that drains the payout queue. Each cycle moves
//! one job into the in-flight list, submits the transfer and acknowledges
//! the job whatever the outcome; failed payouts are reported, not retried.
//! A job still in flight at startup was popped by a process that died
//! mid-payout. Whether it was paid is unknown, so it is parked in the
//! unconfirmed list for an operator instead of being sent again.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::DispatcherConfig;
use crate::error::{Result, ServiceError};
use crate::ledger::LedgerClient;
use crate::notify::NotificationSink;
use crate::rewards::PayoutJob;
use crate::storage::{KeySpace, Store};

const EVENT_TAG: &str = "[NFT_EVENT]";

/// Record of a completed payout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutResult {
    pub address: String,
    pub transaction_hash: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

/// What one dispatcher cycle did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cycle {
    Idle,
    Paid { address: String, transaction_hash: String },
    Failed { address: String },
    /// The queued item could not be decoded
    Dropped,
}

pub struct PayoutDispatcher {
    store: Arc<dyn Store>,
    keys: KeySpace,
    ledger: Arc<dyn LedgerClient>,
    notifier: Arc<dyn NotificationSink>,
    config: DispatcherConfig,
}

impl PayoutDispatcher {
    pub fn new(
        store: Arc<dyn Store>,
        keys: KeySpace,
        ledger: Arc<dyn LedgerClient>,
        notifier: Arc<dyn NotificationSink>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            store,
            keys,
            ledger,
            notifier,
            config,
        }
    }

    /// Park jobs a previous process left in flight. Returns how many.
    pub async fn recover_unconfirmed(&self) -> Result<usize> {
        let inflight = self.keys.payout_inflight();
        let unconfirmed = self.keys.payout_unconfirmed();
        let mut moved = 0;

        while let Some(raw) = self.store.list_move(&inflight, &unconfirmed).await? {
            warn!("Payout left in flight by a previous run, needs manual check: {}", raw);
            self.notifier
                .notify(&format!("{}[UNCONFIRMED] {}", EVENT_TAG, raw))
                .await;
            moved += 1;
        }

        if moved > 0 {
            warn!("{} unconfirmed payouts moved to {}", moved, unconfirmed);
        }
        Ok(moved)
    }

    /// Process at most one queued job
    pub async fn run_once(&self) -> Result<Cycle> {
        let inflight = self.keys.payout_inflight();
        let Some(raw) = self
            .store
            .list_move(&self.keys.payout_queue(), &inflight)
            .await?
        else {
            return Ok(Cycle::Idle);
        };

        let job = match PayoutJob::decode(&raw) {
            Ok(job) => job,
            Err(e) => {
                error!("Dropping undecodable payout job {:?}: {}", raw, e);
                self.notifier
                    .notify(&format!("{}[FAILED] undecodable job {}", EVENT_TAG, raw))
                    .await;
                self.store.list_remove(&inflight, &raw).await?;
                return Ok(Cycle::Dropped);
            }
        };

        info!("Sending {} {} to {}", job.amount, self.config.token_symbol, job.address);

        let cycle = match self.submit(&job).await {
            Ok(transaction_hash) => {
                info!("Paid {}: {}", job.address, transaction_hash);
                self.notifier
                    .notify(&format!(
                        "{}[SUCCESS] {}{} {}\n{}/transactions/{}",
                        EVENT_TAG,
                        job.amount,
                        self.config.token_symbol,
                        job.address,
                        self.config.explorer_host.trim_end_matches('/'),
                        transaction_hash
                    ))
                    .await;
                if let Err(e) = self.record_result(&job.address, &transaction_hash).await {
                    error!(
                        "Paid {} ({}) but could not record the result: {}",
                        job.address, transaction_hash, e
                    );
                    // The transfer went through, so it must not be parked as unconfirmed.
                    self.store.list_remove(&inflight, &raw).await?;
                    return Err(e);
                }
                Cycle::Paid {
                    address: job.address.clone(),
                    transaction_hash,
                }
            }
            Err(e) => {
                warn!("Payout to {} failed: {}", job.address, e);
                self.notify_failure(&job, &e.to_string()).await;
                Cycle::Failed {
                    address: job.address.clone(),
                }
            }
        };

        self.store.list_remove(&inflight, &raw).await?;
        Ok(cycle)
    }

    /// Drain the queue until `shutdown` turns true. Shutdown is only observed
    /// between cycles.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Payout dispatcher started (idle interval {}s)",
            self.config.idle_interval_secs
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let pause = match self.run_once().await {
                Ok(Cycle::Idle) => {
                    debug!("Payout queue empty");
                    true
                }
                Ok(_) => false,
                Err(e) => {
                    error!("Payout cycle failed: {}", e);
                    true
                }
            };

            if pause {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.idle_interval()) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        }

        info!("Payout dispatcher stopped");
    }

    /// Submit one transfer, returning its transaction hash
    async fn submit(&self, job: &PayoutJob) -> Result<String> {
        let receipt = self
            .ledger
            .submit_transfer(&self.config.source_wallet, &job.address, &job.amount)
            .await
            .map_err(|e| ServiceError::LedgerSubmissionFailed(e.to_string()))?;

        if !receipt.is_success() {
            return Err(ServiceError::LedgerSubmissionFailed(format!(
                "code {}: {}",
                receipt.code, receipt.raw_log
            )));
        }
        Ok(receipt.transaction_hash)
    }

    async fn record_result(&self, address: &str, transaction_hash: &str) -> Result<()> {
        let result = PayoutResult {
            address: address.to_string(),
            transaction_hash: transaction_hash.to_string(),
            timestamp: Utc::now().timestamp_millis(),
        };
        let value = serde_json::to_string(&result).unwrap_or_default();
        self.store
            .sorted_set_add(&self.keys.payout_results(), result.timestamp as f64, &value)
            .await?;
        Ok(())
    }

    async fn notify_failure(&self, job: &PayoutJob, detail: &str) {
        self.notifier
            .notify(&format!(
                "{}[FAILED] {}{} {} {}",
                EVENT_TAG, job.amount, self.config.token_symbol, job.address, detail
            ))
            .await;
    }
}
