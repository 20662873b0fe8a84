//! Capped recency-ordered feeds
//!
//! Each feed is a sorted set scored by the insertion time in milliseconds.
//! An entry landing in the same millisecond as the newest one is scored one
//! above it, so scores strictly increase in arrival order. Insert and trim to
//! the cap are one store step.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::FeedConfig;
use crate::error::Result;
use crate::storage::{KeySpace, Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feed {
    Gallery,
    Featured,
}

impl Feed {
    pub fn name(&self) -> &'static str {
        match self {
            Feed::Gallery => "gallery",
            Feed::Featured => "featured",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub item_id: String,
    pub address: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

impl LeaderboardEntry {
    /// ISO-8601 UTC rendering of the timestamp
    pub fn timestamp_iso(&self) -> String {
        Utc.timestamp_millis_opt(self.timestamp)
            .single()
            .map(|t| t.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
            .unwrap_or_default()
    }
}

pub struct LeaderboardStore {
    store: Arc<dyn Store>,
    keys: KeySpace,
    gallery_cap: usize,
    featured_cap: usize,
}

impl LeaderboardStore {
    pub fn new(store: Arc<dyn Store>, keys: KeySpace, config: &FeedConfig) -> Self {
        Self {
            store,
            keys,
            gallery_cap: config.gallery_cap,
            featured_cap: config.featured_cap,
        }
    }

    pub fn cap(&self, feed: Feed) -> usize {
        match feed {
            Feed::Gallery => self.gallery_cap,
            Feed::Featured => self.featured_cap,
        }
    }

    /// Append `item_id` stamped with the current time
    pub async fn record(&self, feed: Feed, item_id: &str, address: &str) -> Result<LeaderboardEntry> {
        let entry = LeaderboardEntry {
            item_id: item_id.to_string(),
            address: address.to_string(),
            timestamp: Utc::now().timestamp_millis(),
        };
        let value = serde_json::to_string(&entry).unwrap_or_default();
        self.store
            .sorted_set_append(
                &self.keys.feed(feed.name()),
                entry.timestamp as f64,
                &value,
                self.cap(feed),
            )
            .await?;
        Ok(entry)
    }

    /// Up to `n` most recent entries, newest first
    pub async fn latest(&self, feed: Feed, n: usize) -> Result<Vec<LeaderboardEntry>> {
        let key = self.keys.feed(feed.name());
        let n = n.min(self.cap(feed));
        let members = self.store.sorted_set_top(&key, n).await?;

        Ok(members
            .into_iter()
            .filter_map(|member| match serde_json::from_str(&member.value) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Skipping unreadable {} feed entry: {}", feed.name(), e);
                    None
                }
            })
            .collect())
    }
}
