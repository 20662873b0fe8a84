//! Component wiring
//!
//! Builds every component once from the configuration and the three
//! external capabilities (store, ledger client, notifier).

use std::sync::Arc;

use crate::addressbook::AddressBook;
use crate::callback::CallbackResolver;
use crate::config::Config;
use crate::dispatcher::PayoutDispatcher;
use crate::feed::LeaderboardStore;
use crate::gallery::GalleryService;
use crate::ledger::LedgerClient;
use crate::nft::{NftDrafts, NftService};
use crate::notify::NotificationSink;
use crate::qr::QrIssuer;
use crate::request::RequestLedger;
use crate::rewards::{RewardQueue, RewardTracker};
use crate::storage::{KeySpace, Store};

pub struct Station {
    pub requests: Arc<RequestLedger>,
    pub addressbook: Arc<AddressBook>,
    pub rewards: Arc<RewardTracker>,
    pub queue: Arc<RewardQueue>,
    pub feeds: Arc<LeaderboardStore>,
    pub drafts: Arc<NftDrafts>,
    pub resolver: Arc<CallbackResolver>,
    pub nft: Arc<NftService>,
    pub gallery: Arc<GalleryService>,
    pub dispatcher: Arc<PayoutDispatcher>,
}

impl Station {
    pub fn new(
        config: &Config,
        store: Arc<dyn Store>,
        ledger: Arc<dyn LedgerClient>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        let keys = KeySpace::new(config.store.namespace.clone());

        let requests = Arc::new(RequestLedger::new(
            store.clone(),
            keys.clone(),
            config.request_ttl(),
        ));
        let addressbook = Arc::new(AddressBook::new(store.clone(), keys.clone()));
        let rewards = Arc::new(RewardTracker::new(store.clone(), keys.clone()));
        let queue = Arc::new(RewardQueue::new(store.clone(), keys.clone()));
        let feeds = Arc::new(LeaderboardStore::new(
            store.clone(),
            keys.clone(),
            &config.feeds,
        ));
        let drafts = Arc::new(NftDrafts::new(store.clone(), keys.clone()));

        let resolver = Arc::new(CallbackResolver::new(
            requests.clone(),
            addressbook.clone(),
            rewards.clone(),
            drafts.clone(),
            ledger.clone(),
            config.rewards.mint,
        ));
        let issuer = Arc::new(QrIssuer::new(
            ledger.clone(),
            requests.clone(),
            &config.ledger,
            &config.requests,
        ));

        let nft = Arc::new(NftService::new(
            issuer.clone(),
            requests.clone(),
            addressbook.clone(),
            drafts.clone(),
            resolver.clone(),
            ledger.clone(),
            &config.ledger,
        ));
        let gallery = Arc::new(GalleryService::new(
            issuer,
            requests.clone(),
            feeds.clone(),
            rewards.clone(),
            store.clone(),
            keys.clone(),
            config.rewards.gallery.clone(),
        ));
        let dispatcher = Arc::new(PayoutDispatcher::new(
            store,
            keys,
            ledger,
            notifier,
            config.dispatcher.clone(),
        ));

        Self {
            requests,
            addressbook,
            rewards,
            queue,
            feeds,
            drafts,
            resolver,
            nft,
            gallery,
            dispatcher,
        }
    }
}
