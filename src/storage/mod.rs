//! Key-value store capability
//!
//! Every piece of shared state lives behind [`Store`]. The operations mirror
//! what a Redis-like server offers: plain values, hashes, FIFO lists and
//! sorted sets, with key-level TTL. The conditional operations
//! (`hash_create`, `hash_compare_and_set`, `hash_set_if_exists`,
//! `sorted_set_append`, `claim_and_push`) are single atomic steps on the server; callers rely on
//! them instead of read-then-write sequences.

mod memory;
mod redis_store;

pub use self::memory::MemoryStore;
pub use self::redis_store::RedisStore;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// Transient infrastructure fault: connection, timeout, server error
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// A key holds data of the wrong shape
    #[error("corrupt data at {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

/// A sorted-set member with its score
#[derive(Debug, Clone, PartialEq)]
pub struct Scored {
    pub value: String,
    pub score: f64,
}

#[async_trait]
pub trait Store: Send + Sync + 'static {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<()>;
    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>>;
    /// All fields of a hash; an absent key yields an empty map
    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>>;
    /// Set `field` only if the field is absent. Returns whether it was set.
    async fn hash_set_if_absent(&self, key: &str, field: &str, value: &str) -> Result<bool>;
    /// Set `field` only if the hash exists, so an expired record is never
    /// recreated without its TTL. Returns whether it was set.
    async fn hash_set_if_exists(&self, key: &str, field: &str, value: &str) -> Result<bool>;
    /// Write every field in `updates` when `field` currently equals
    /// `expected`. An absent hash or field never matches.
    async fn hash_compare_and_set(
        &self,
        key: &str,
        field: &str,
        expected: &str,
        updates: &[(&str, String)],
    ) -> Result<bool>;
    /// Create a hash with all `fields` (and the TTL, if any) in one step.
    /// Returns false without writing if the key already exists.
    async fn hash_create(
        &self,
        key: &str,
        fields: &[(&str, String)],
        ttl: Option<Duration>,
    ) -> Result<bool>;

    async fn expire(&self, key: &str, ttl: Duration) -> Result<()>;

    async fn sorted_set_add(&self, key: &str, score: f64, value: &str) -> Result<()>;
    /// Highest-scored `n` members, descending
    async fn sorted_set_top(&self, key: &str, n: usize) -> Result<Vec<Scored>>;
    /// Drop everything but the `keep` highest-scored members
    async fn sorted_set_trim(&self, key: &str, keep: usize) -> Result<()>;
    /// Add `value` scored above every current member (and at least
    /// `min_score`), then trim to `keep`. Returns the score used.
    async fn sorted_set_append(
        &self,
        key: &str,
        min_score: f64,
        value: &str,
        keep: usize,
    ) -> Result<f64>;

    /// Push onto the list head (producer side)
    async fn list_push(&self, key: &str, value: &str) -> Result<()>;
    /// Pop from the list tail (consumer side)
    async fn list_pop_tail(&self, key: &str) -> Result<Option<String>>;
    /// Atomically pop the tail of `source` and push it onto the head of
    /// `destination`, returning the moved element
    async fn list_move(&self, source: &str, destination: &str) -> Result<Option<String>>;
    /// Remove one occurrence of `value`. Returns whether one was removed.
    async fn list_remove(&self, key: &str, value: &str) -> Result<bool>;
    /// Elements from head to tail
    async fn list_range(&self, key: &str) -> Result<Vec<String>>;
    async fn list_len(&self, key: &str) -> Result<usize>;

    /// Set `hash_key[field] = marker` only if absent and, in the same atomic
    /// step, push `item` onto `list_key` when the marker was set.
    async fn claim_and_push(
        &self,
        hash_key: &str,
        field: &str,
        marker: &str,
        list_key: &str,
        item: &str,
    ) -> Result<bool>;
}

/// Logical key layout, optionally namespaced
#[derive(Debug, Clone, Default)]
pub struct KeySpace {
    namespace: String,
}

impl KeySpace {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    fn key(&self, name: &str) -> String {
        format!("{}{}", self.namespace, name)
    }

    pub fn request(&self, request_key: &str) -> String {
        self.key(&format!("request:{}", request_key))
    }

    pub fn addressbook(&self) -> String {
        self.key("addressbook")
    }

    pub fn reward_marker(&self, program: &str) -> String {
        self.key(&format!("rewardmarker:{}", program))
    }

    pub fn payout_queue(&self) -> String {
        self.key("payoutqueue")
    }

    pub fn payout_inflight(&self) -> String {
        self.key("payoutqueue:inflight")
    }

    pub fn payout_unconfirmed(&self) -> String {
        self.key("payoutqueue:unconfirmed")
    }

    pub fn payout_results(&self) -> String {
        self.key("payoutresults")
    }

    pub fn feed(&self, name: &str) -> String {
        self.key(&format!("feed:{}", name))
    }

    pub fn nft(&self, dapp_nft_id: &str) -> String {
        self.key(&format!("nft:{}", dapp_nft_id))
    }

    pub fn gallery_submissions(&self, address: &str) -> String {
        self.key(&format!("gallery:{}", address))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        let keys = KeySpace::default();
        assert_eq!(keys.request("abc"), "request:abc");
        assert_eq!(keys.reward_marker("mint"), "rewardmarker:mint");
        assert_eq!(keys.feed("featured"), "feed:featured");

        let keys = KeySpace::new("station:");
        assert_eq!(keys.payout_queue(), "station:payoutqueue");
        assert_eq!(keys.payout_inflight(), "station:payoutqueue:inflight");
    }
}
