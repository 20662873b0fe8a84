//! Reward eligibility and payout queue
//!
//! Each program keeps one marker hash (`rewardmarker:<program>`, field =
//! address). A claim sets the marker and pushes the payout job in a single
//! atomic store step, so an address is paid at most once per program no
//! matter how many callbacks race for it.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::storage::{KeySpace, Store};

const MARKER: &str = "1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RewardProgram {
    Mint,
    Gallery,
}

impl RewardProgram {
    pub fn name(&self) -> &'static str {
        match self {
            RewardProgram::Mint => "mint",
            RewardProgram::Gallery => "gallery",
        }
    }
}

impl fmt::Display for RewardProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One payout: `amount` is a decimal string with six fractional digits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutJob {
    pub address: String,
    pub amount: String,
}

impl PayoutJob {
    pub fn new(address: impl Into<String>, amount: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            amount: amount.into(),
        }
    }

    pub fn encode(&self) -> String {
        // Two string fields always serialize.
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn decode(raw: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewardOutcome {
    Queued,
    AlreadyRewarded,
}

pub struct RewardTracker {
    store: Arc<dyn Store>,
    keys: KeySpace,
}

impl RewardTracker {
    pub fn new(store: Arc<dyn Store>, keys: KeySpace) -> Self {
        Self { store, keys }
    }

    pub async fn is_eligible(&self, address: &str, program: RewardProgram) -> Result<bool> {
        let marker = self
            .store
            .hash_get(&self.keys.reward_marker(program.name()), address)
            .await?;
        Ok(marker.is_none())
    }

    /// Mark `job.address` as rewarded under `program` and queue the payout,
    /// both or neither
    pub async fn claim(&self, program: RewardProgram, job: &PayoutJob) -> Result<RewardOutcome> {
        let queued = self
            .store
            .claim_and_push(
                &self.keys.reward_marker(program.name()),
                &job.address,
                MARKER,
                &self.keys.payout_queue(),
                &job.encode(),
            )
            .await?;

        if queued {
            info!(
                "Queued {} reward of {} for {}",
                program, job.amount, job.address
            );
            Ok(RewardOutcome::Queued)
        } else {
            Ok(RewardOutcome::AlreadyRewarded)
        }
    }
}

/// FIFO of payout jobs. Producers push at the head, the dispatcher takes
/// from the tail.
pub struct RewardQueue {
    store: Arc<dyn Store>,
    keys: KeySpace,
}

impl RewardQueue {
    pub fn new(store: Arc<dyn Store>, keys: KeySpace) -> Self {
        Self { store, keys }
    }

    /// Queue a payout without an eligibility check
    pub async fn enqueue(&self, job: &PayoutJob) -> Result<()> {
        self.store
            .list_push(&self.keys.payout_queue(), &job.encode())
            .await?;
        Ok(())
    }

    pub async fn len(&self) -> Result<usize> {
        Ok(self.store.list_len(&self.keys.payout_queue()).await?)
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Jobs in the order they will be paid
    pub async fn pending(&self) -> Result<Vec<PayoutJob>> {
        let raw = self.store.list_range(&self.keys.payout_queue()).await?;
        Ok(raw
            .iter()
            .rev()
            .filter_map(|item| PayoutJob::decode(item).ok())
            .collect())
    }
}
