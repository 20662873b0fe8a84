//! Gallery submissions and feeds

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{AmountRange, GalleryRewards};
use crate::error::{Result, ServiceError};
use crate::feed::{Feed, LeaderboardEntry, LeaderboardStore};
use crate::qr::{QrIssuer, SignQr};
use crate::request::{RequestLedger, RequestView};
use crate::rewards::{PayoutJob, RewardOutcome, RewardProgram, RewardTracker};
use crate::storage::{KeySpace, Store};

/// Placement picked by the first character of a submission code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GalleryTier {
    /// `1`: general and featured feeds
    Featured,
    /// `3`: no feed
    Hidden,
    /// Anything else: general feed
    Standard,
}

impl GalleryTier {
    pub fn from_code(code: &str) -> Self {
        match code.chars().next() {
            Some('1') => GalleryTier::Featured,
            Some('3') => GalleryTier::Hidden,
            _ => GalleryTier::Standard,
        }
    }

    fn feeds(&self) -> &'static [Feed] {
        match self {
            GalleryTier::Featured => &[Feed::Gallery, Feed::Featured],
            GalleryTier::Hidden => &[],
            GalleryTier::Standard => &[Feed::Gallery],
        }
    }

    fn reward(&self, rewards: &GalleryRewards) -> AmountRange {
        match self {
            GalleryTier::Featured => rewards.featured,
            GalleryTier::Hidden => rewards.hidden,
            GalleryTier::Standard => rewards.standard,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submission {
    pub tier: GalleryTier,
    pub reward: RewardOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MyGallery {
    pub nft_id_list: Vec<String>,
    pub rewarded: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NftListItem {
    pub nft_id: String,
    /// ISO-8601, UTC
    pub timestamp: String,
}

impl From<LeaderboardEntry> for NftListItem {
    fn from(entry: LeaderboardEntry) -> Self {
        Self {
            timestamp: entry.timestamp_iso(),
            nft_id: entry.item_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NftList {
    pub nft_list: Vec<NftListItem>,
}

pub struct GalleryService {
    issuer: Arc<QrIssuer>,
    requests: Arc<RequestLedger>,
    feeds: Arc<LeaderboardStore>,
    rewards: Arc<RewardTracker>,
    store: Arc<dyn Store>,
    keys: KeySpace,
    tiers: GalleryRewards,
}

impl GalleryService {
    pub fn new(
        issuer: Arc<QrIssuer>,
        requests: Arc<RequestLedger>,
        feeds: Arc<LeaderboardStore>,
        rewards: Arc<RewardTracker>,
        store: Arc<dyn Store>,
        keys: KeySpace,
        tiers: GalleryRewards,
    ) -> Self {
        Self {
            issuer,
            requests,
            feeds,
            rewards,
            store,
            keys,
            tiers,
        }
    }

    pub async fn login_qr(&self) -> Result<SignQr> {
        self.issuer.login().await
    }

    pub async fn status(&self, request_key: &str) -> Result<RequestView> {
        self.requests.get(request_key).await
    }

    /// Place the item per its code, record it for the signer and claim the
    /// signer's one-time gallery reward
    pub async fn submit(&self, signer: &str, item_id: &str, code: &str) -> Result<Submission> {
        if signer.is_empty() || item_id.is_empty() {
            return Err(ServiceError::InvalidInput(
                "signer and nftId are required".to_string(),
            ));
        }

        let tier = GalleryTier::from_code(code);
        for feed in tier.feeds() {
            self.feeds.record(*feed, item_id, signer).await?;
        }

        self.store
            .list_push(&self.keys.gallery_submissions(signer), item_id)
            .await?;

        let job = PayoutJob::new(signer, tier.reward(&self.tiers).sample());
        let reward = self.rewards.claim(RewardProgram::Gallery, &job).await?;

        info!("Gallery item {} from {} ({:?})", item_id, signer, tier);
        Ok(Submission { tier, reward })
    }

    /// Items submitted by `address`, oldest first
    pub async fn my_gallery(&self, address: &str) -> Result<MyGallery> {
        let mut nft_id_list = self
            .store
            .list_range(&self.keys.gallery_submissions(address))
            .await?;
        nft_id_list.reverse();

        let rewarded = !self
            .rewards
            .is_eligible(address, RewardProgram::Gallery)
            .await?;

        Ok(MyGallery {
            nft_id_list,
            rewarded,
        })
    }

    pub async fn latest(&self) -> Result<NftList> {
        self.list(Feed::Gallery).await
    }

    pub async fn latest_featured(&self) -> Result<NftList> {
        self.list(Feed::Featured).await
    }

    async fn list(&self, feed: Feed) -> Result<NftList> {
        let entries = self.feeds.latest(feed, self.feeds.cap(feed)).await?;
        Ok(NftList {
            nft_list: entries.into_iter().map(NftListItem::from).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::station;

    #[test]
    fn test_tier_from_code() {
        assert_eq!(GalleryTier::from_code("1abc"), GalleryTier::Featured);
        assert_eq!(GalleryTier::from_code("2"), GalleryTier::Standard);
        assert_eq!(GalleryTier::from_code("3x"), GalleryTier::Hidden);
        assert_eq!(GalleryTier::from_code("9"), GalleryTier::Standard);
        assert_eq!(GalleryTier::from_code(""), GalleryTier::Standard);
    }

    #[tokio::test]
    async fn test_featured_submission() {
        let (station, _, _) = station();

        let submission = station.gallery.submit("addr1", "n1", "1").await.unwrap();
        assert_eq!(submission.tier, GalleryTier::Featured);
        assert_eq!(submission.reward, RewardOutcome::Queued);

        let latest = station.gallery.latest().await.unwrap();
        let featured = station.gallery.latest_featured().await.unwrap();
        assert_eq!(latest.nft_list.len(), 1);
        assert_eq!(featured.nft_list[0].nft_id, "n1");
        assert!(featured.nft_list[0].timestamp.ends_with('Z'));

        let jobs = station.queue.pending().await.unwrap();
        assert_eq!(jobs.len(), 1);
        let amount: f64 = jobs[0].amount.parse().unwrap();
        assert!((19.0..20.0).contains(&amount));
        assert_eq!(jobs[0].amount.split('.').nth(1).map(str::len), Some(6));
    }

    #[tokio::test]
    async fn test_hidden_submission_skips_feeds() {
        let (station, _, _) = station();
        station.gallery.submit("addr1", "n1", "3").await.unwrap();

        assert!(station.gallery.latest().await.unwrap().nft_list.is_empty());
        assert!(station.gallery.latest_featured().await.unwrap().nft_list.is_empty());

        let jobs = station.queue.pending().await.unwrap();
        let amount: f64 = jobs[0].amount.parse().unwrap();
        assert!((15.0..17.0).contains(&amount));
    }

    #[tokio::test]
    async fn test_reward_once_per_address() {
        let (station, _, _) = station();

        let first = station.gallery.submit("addr1", "n1", "2").await.unwrap();
        let second = station.gallery.submit("addr1", "n2", "1").await.unwrap();
        assert_eq!(first.reward, RewardOutcome::Queued);
        assert_eq!(second.reward, RewardOutcome::AlreadyRewarded);
        assert_eq!(station.queue.len().await.unwrap(), 1);

        let mine = station.gallery.my_gallery("addr1").await.unwrap();
        assert_eq!(mine.nft_id_list, vec!["n1", "n2"]);
        assert!(mine.rewarded);

        let other = station.gallery.my_gallery("addr2").await.unwrap();
        assert!(other.nft_id_list.is_empty());
        assert!(!other.rewarded);
    }

    #[tokio::test]
    async fn test_submit_validates_input() {
        let (station, _, _) = station();
        let err = station.gallery.submit("", "n1", "1").await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
        assert!(station.queue.is_empty().await.unwrap());
    }
}
