//! Sign Station - QR wallet sign requests and airdrop payouts
//!
//! The service issues single-use sign requests (QR codes a wallet app scans
//! to log in or to sign an NFT mint), correlates the wallet's asynchronous
//! callback back to the request that created it, and pays a one-time token
//! reward per address and program through a background payout queue.
//!
//! # How it works
//!
//! 1. A client asks for a login or mint QR; the relay issues a pairing
//!    payload whose token becomes the request key
//! 2. The request is stored as PENDING with a TTL and polled by the client
//! 3. The wallet calls back; LOGIN signatures are verified, MINT callbacks
//!    carry the transaction hash
//! 4. The first callback to move the request out of PENDING wins; a MINT
//!    winner claims the mint reward for the signer
//! 5. The payout dispatcher drains the queue one transfer at a time
//!
//! # Guarantees
//!
//! - Status never leaves a terminal state (compare-and-set transitions)
//! - At most one payout per address per reward program (marker write and
//!   enqueue are one atomic store step)
//! - Payouts are made in queue order; a payout interrupted by a crash is
//!   parked for manual review, never sent twice

pub mod addressbook;
pub mod callback;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod feed;
pub mod gallery;
pub mod ledger;
pub mod nft;
pub mod notify;
pub mod qr;
pub mod relay;
pub mod request;
pub mod rewards;
pub mod server;
pub mod station;
pub mod storage;

#[cfg(test)]
pub(crate) mod testing;

pub use config::Config;
pub use dispatcher::{Cycle, PayoutDispatcher};
pub use error::{Result, ServiceError};
pub use ledger::{LedgerClient, LedgerError};
pub use relay::HttpLedgerClient;
pub use request::{RequestKind, RequestStatus};
pub use station::Station;
pub use storage::{KeySpace, MemoryStore, RedisStore, Store, StoreError};
