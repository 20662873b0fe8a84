//! Wallet callback resolution
//!
//! The wallet app calls back once the user approves or rejects a sign
//! request. Resolution loads the request, checks the signature for LOGIN
//! requests and moves the status out of PENDING. For MINT requests only the
//! caller that wins the PENDING -> SUCCESS transition runs the side effects
//! (draft update, reward claim), so a redelivered or concurrent callback
//! never pays twice.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::addressbook::AddressBook;
use crate::config::AmountRange;
use crate::error::{Result, ServiceError};
use crate::ledger::{pubkey_from_raw_signed_data, LedgerClient};
use crate::nft::NftDrafts;
use crate::request::{RequestKind, RequestLedger, RequestStatus, SignRequest, Transition};
use crate::rewards::{PayoutJob, RewardOutcome, RewardProgram, RewardTracker};

/// Final state a callback left the request in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Success,
    Invalid,
    /// An earlier delivery already resolved the request
    AlreadyResolved(RequestStatus),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginPayload {
    address: String,
    raw_data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MintPayload {
    #[serde(alias = "txhash")]
    transaction_hash: String,
    #[serde(default)]
    nft_id: Option<Value>,
}

impl MintPayload {
    fn nft_id(&self) -> Option<String> {
        match self.nft_id.as_ref()? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

pub struct CallbackResolver {
    requests: Arc<RequestLedger>,
    addressbook: Arc<AddressBook>,
    rewards: Arc<RewardTracker>,
    drafts: Arc<NftDrafts>,
    ledger: Arc<dyn LedgerClient>,
    mint_reward: AmountRange,
}

impl CallbackResolver {
    pub fn new(
        requests: Arc<RequestLedger>,
        addressbook: Arc<AddressBook>,
        rewards: Arc<RewardTracker>,
        drafts: Arc<NftDrafts>,
        ledger: Arc<dyn LedgerClient>,
        mint_reward: AmountRange,
    ) -> Self {
        Self {
            requests,
            addressbook,
            rewards,
            drafts,
            ledger,
            mint_reward,
        }
    }

    pub async fn resolve(
        &self,
        request_key: &str,
        approved: bool,
        sign_data: &Value,
    ) -> Result<Resolution> {
        let request = self
            .requests
            .find(request_key)
            .await?
            .ok_or(ServiceError::RequestNotFound)?;

        if !approved {
            debug!("Request {} rejected by the wallet", request_key);
            return self.finish(request_key, RequestStatus::Invalid).await;
        }

        if request.status.is_terminal() {
            debug!(
                "Request {} already resolved as {:?}",
                request_key, request.status
            );
            return Ok(Resolution::AlreadyResolved(request.status));
        }

        match request.kind {
            RequestKind::Login => self.resolve_login(&request, sign_data).await,
            RequestKind::Mint => self.resolve_mint(&request, sign_data).await,
        }
    }

    async fn resolve_login(&self, request: &SignRequest, sign_data: &Value) -> Result<Resolution> {
        let payload: LoginPayload = match LoginPayload::deserialize(sign_data) {
            Ok(payload) => payload,
            Err(e) => return self.fail_malformed(&request.key, e.to_string()).await,
        };

        match self.verify_login(request, &payload).await {
            Ok(()) => {}
            Err(ServiceError::SignatureInvalid) => {
                info!("Invalid login signature for request {}", request.key);
                return self.finish(&request.key, RequestStatus::Invalid).await;
            }
            Err(e) => {
                error!("Login verification for {} failed: {}", request.key, e);
                self.requests
                    .set_status(&request.key, RequestStatus::Failed)
                    .await?;
                return Err(e);
            }
        }

        if !request.signer.is_empty() && request.signer != payload.address {
            warn!(
                "Request {} expects signer {}, signed by {}",
                request.key, request.signer, payload.address
            );
            return self.finish(&request.key, RequestStatus::Invalid).await;
        }

        let transition = self
            .requests
            .bind_signer(&request.key, &payload.address)
            .await?;
        let resolution = settle(transition, RequestStatus::Success)?;
        if resolution == Resolution::Success {
            match pubkey_from_raw_signed_data(&payload.raw_data) {
                Some(pubkey) => {
                    self.addressbook
                        .register_if_absent(&payload.address, &pubkey)
                        .await?;
                }
                None => warn!("No public key in login data from {}", payload.address),
            }
            info!("Login {} signed by {}", request.key, payload.address);
        }
        Ok(resolution)
    }

    async fn verify_login(&self, request: &SignRequest, payload: &LoginPayload) -> Result<()> {
        let valid = self
            .ledger
            .verify_arbitrary_signature(&payload.raw_data, &request.message)
            .await?;
        if valid {
            Ok(())
        } else {
            Err(ServiceError::SignatureInvalid)
        }
    }

    async fn resolve_mint(&self, request: &SignRequest, sign_data: &Value) -> Result<Resolution> {
        let payload: MintPayload = match MintPayload::deserialize(sign_data) {
            Ok(payload) if !payload.transaction_hash.is_empty() => payload,
            Ok(_) => {
                return self
                    .fail_malformed(&request.key, "empty transaction hash".to_string())
                    .await
            }
            Err(e) => return self.fail_malformed(&request.key, e.to_string()).await,
        };

        let resolution = self.finish(&request.key, RequestStatus::Success).await?;
        if resolution != Resolution::Success {
            return Ok(resolution);
        }

        self.requests
            .record_signature(&request.key, &sign_data.to_string())
            .await?;

        if !request.extra.is_empty() {
            let recorded = self
                .drafts
                .record_mint(
                    &request.extra,
                    payload.nft_id().as_deref(),
                    &payload.transaction_hash,
                )
                .await?;
            if !recorded {
                warn!("NFT draft {} missing, mint not recorded", request.extra);
            }
        }

        if request.signer.is_empty() {
            warn!("Mint request {} has no signer, no reward", request.key);
            return Ok(resolution);
        }

        let job = PayoutJob::new(request.signer.clone(), self.mint_reward.sample());
        if self.rewards.claim(RewardProgram::Mint, &job).await? == RewardOutcome::AlreadyRewarded {
            debug!("{} already received the mint reward", request.signer);
        }

        info!(
            "Mint {} confirmed for {}: {}",
            request.key, request.signer, payload.transaction_hash
        );
        Ok(resolution)
    }

    /// Move the request to `status` and report what happened
    async fn finish(&self, request_key: &str, status: RequestStatus) -> Result<Resolution> {
        let transition = self.requests.set_status(request_key, status).await?;
        settle(transition, status)
    }

    async fn fail_malformed(&self, request_key: &str, reason: String) -> Result<Resolution> {
        error!("Malformed callback payload for {}: {}", request_key, reason);
        self.requests
            .set_status(request_key, RequestStatus::Failed)
            .await?;
        Err(ServiceError::CallbackPayloadMalformed(reason))
    }
}

fn settle(transition: Transition, status: RequestStatus) -> Result<Resolution> {
    match transition {
        Transition::Applied => Ok(match status {
            RequestStatus::Success => Resolution::Success,
            RequestStatus::Invalid => Resolution::Invalid,
            other => Resolution::AlreadyResolved(other),
        }),
        Transition::Unchanged => Ok(Resolution::AlreadyResolved(status)),
        Transition::Refused { current } => Ok(Resolution::AlreadyResolved(current)),
        Transition::Missing => Err(ServiceError::RequestNotFound),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LedgerError;
    use crate::request::RequestKind;
    use crate::testing::station;
    use serde_json::json;
    use tokio_test::assert_ok;

    fn login_payload(address: &str) -> Value {
        json!({ "address": address, "rawData": "{\"pubkey\":\"PK1\"}" })
    }

    #[tokio::test]
    async fn test_login_success_binds_signer() {
        let (station, _, _) = station();
        station
            .requests
            .open_keyed("k1", RequestKind::Login, "m1", "", "")
            .await
            .unwrap();
        assert_eq!(station.requests.get("k1").await.unwrap().status, 0);

        let resolution = assert_ok!(station.resolver.resolve("k1", true, &login_payload("A")).await);
        assert_eq!(resolution, Resolution::Success);

        let view = station.requests.get("k1").await.unwrap();
        assert_eq!(view.status, 1);
        assert_eq!(view.signer, "A");
        assert_eq!(
            station.addressbook.pubkey("A").await.unwrap().as_deref(),
            Some("PK1")
        );
        // Logins never pay.
        assert!(station.queue.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_login_bad_signature_is_invalid() {
        let (station, ledger, _) = station();
        ledger.set_verify(Ok(false));
        let key = station
            .requests
            .open(RequestKind::Login, "m1", "", "")
            .await
            .unwrap();

        let resolution = station
            .resolver
            .resolve(&key, true, &login_payload("A"))
            .await
            .unwrap();
        assert_eq!(resolution, Resolution::Invalid);

        let view = station.requests.get(&key).await.unwrap();
        assert_eq!(view.status, -2);
        assert!(view.signer.is_empty());
        assert!(station.addressbook.pubkey("A").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_login_from_other_signer_is_invalid() {
        let (station, _, _) = station();
        station
            .requests
            .open_keyed("k1", RequestKind::Login, "m1", "X", "")
            .await
            .unwrap();

        let resolution = station
            .resolver
            .resolve("k1", true, &login_payload("Y"))
            .await
            .unwrap();
        assert_eq!(resolution, Resolution::Invalid);

        let view = station.requests.get("k1").await.unwrap();
        assert_eq!(view.status, -2);
        assert_eq!(view.signer, "X");
        assert!(station.addressbook.pubkey("Y").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_login_from_expected_signer_succeeds() {
        let (station, _, _) = station();
        station
            .requests
            .open_keyed("k1", RequestKind::Login, "m1", "X", "")
            .await
            .unwrap();

        let resolution = station
            .resolver
            .resolve("k1", true, &login_payload("X"))
            .await
            .unwrap();
        assert_eq!(resolution, Resolution::Success);
        assert_eq!(station.requests.get("k1").await.unwrap().status, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_rejection_leaves_no_signer() {
        for _ in 0..20 {
            let (station, _, _) = station();
            let key = station
                .requests
                .open(RequestKind::Login, "m1", "", "")
                .await
                .unwrap();

            let payload = login_payload("A");
            let (approve, reject) = futures::join!(
                station.resolver.resolve(&key, true, &payload),
                station.resolver.resolve(&key, false, &Value::Null)
            );
            assert_ok!(approve);
            assert_ok!(reject);

            let view = station.requests.get(&key).await.unwrap();
            match view.status {
                1 => assert_eq!(view.signer, "A"),
                -2 => assert!(view.signer.is_empty()),
                other => panic!("unexpected status {}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_verification_outage_marks_failed() {
        let (station, ledger, _) = station();
        ledger.set_verify(Err(LedgerError::Transport("timeout".to_string())));
        let key = station
            .requests
            .open(RequestKind::Login, "m1", "", "")
            .await
            .unwrap();

        let err = station
            .resolver
            .resolve(&key, true, &login_payload("A"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Ledger(_)));
        assert_eq!(station.requests.get(&key).await.unwrap().status, -1);
        assert!(station.requests.find(&key).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_malformed_payload_marks_failed() {
        let (station, _, _) = station();
        let login = station
            .requests
            .open(RequestKind::Login, "m1", "", "")
            .await
            .unwrap();
        let mint = station
            .requests
            .open(RequestKind::Mint, "doc", "A", "")
            .await
            .unwrap();

        let err = station
            .resolver
            .resolve(&login, true, &json!({ "address": "A" }))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::CallbackPayloadMalformed(_)));

        let err = station
            .resolver
            .resolve(&mint, true, &json!("not an object"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::CallbackPayloadMalformed(_)));

        assert_eq!(station.requests.find(&login).await.unwrap().unwrap().status, RequestStatus::Failed);
        assert_eq!(station.requests.find(&mint).await.unwrap().unwrap().status, RequestStatus::Failed);
        assert!(station.queue.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_key() {
        let (station, _, _) = station();
        let err = station
            .resolver
            .resolve("missing", false, &Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::RequestNotFound));
    }

    #[tokio::test]
    async fn test_rejected_mint_is_invalid_without_payout() {
        let (station, _, _) = station();
        let key = station
            .requests
            .open(RequestKind::Mint, "doc", "A", "")
            .await
            .unwrap();

        let resolution = station.resolver.resolve(&key, false, &Value::Null).await.unwrap();
        assert_eq!(resolution, Resolution::Invalid);
        assert_eq!(station.requests.get(&key).await.unwrap().status, -2);
        assert!(station.queue.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_repeated_rejection_stays_invalid() {
        let (station, _, _) = station();
        let key = station
            .requests
            .open(RequestKind::Login, "m1", "", "")
            .await
            .unwrap();

        for _ in 0..2 {
            assert_ok!(station.resolver.resolve(&key, false, &Value::Null).await);
            assert_eq!(station.requests.get(&key).await.unwrap().status, -2);
        }

        // A late approval cannot override the rejection.
        let resolution = station
            .resolver
            .resolve(&key, true, &login_payload("A"))
            .await
            .unwrap();
        assert_eq!(resolution, Resolution::AlreadyResolved(RequestStatus::Invalid));
        assert_eq!(station.requests.get(&key).await.unwrap().status, -2);
    }

    #[tokio::test]
    async fn test_mint_success_records_and_queues() {
        let (station, _, _) = station();
        let key = station
            .requests
            .open(RequestKind::Mint, "doc", "A", "")
            .await
            .unwrap();
        let payload = json!({ "transactionHash": "ABC" });

        let resolution = station.resolver.resolve(&key, true, &payload).await.unwrap();
        assert_eq!(resolution, Resolution::Success);

        let view = station.requests.get(&key).await.unwrap();
        assert_eq!(view.status, 1);
        assert_eq!(serde_json::from_str::<Value>(&view.sign_data).unwrap(), payload);

        let jobs = station.queue.pending().await.unwrap();
        assert_eq!(jobs, vec![PayoutJob::new("A", "2.000000")]);

        // Redelivery has no side effects.
        let again = station.resolver.resolve(&key, true, &payload).await.unwrap();
        assert_eq!(again, Resolution::AlreadyResolved(RequestStatus::Success));
        assert_eq!(station.queue.len().await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callbacks_same_key_pay_once() {
        let (station, _, _) = station();
        let station = Arc::new(station);
        let key = station
            .requests
            .open(RequestKind::Mint, "doc", "A", "")
            .await
            .unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let station = station.clone();
                let key = key.clone();
                tokio::spawn(async move {
                    station
                        .resolver
                        .resolve(&key, true, &json!({ "txhash": "ABC" }))
                        .await
                })
            })
            .collect();

        let mut winners = 0;
        for result in futures::future::join_all(handles).await {
            if result.unwrap().unwrap() == Resolution::Success {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(station.queue.len().await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_mints_same_address_pay_once() {
        let (station, _, _) = station();
        let first = station
            .requests
            .open(RequestKind::Mint, "doc1", "A", "")
            .await
            .unwrap();
        let second = station
            .requests
            .open(RequestKind::Mint, "doc2", "A", "")
            .await
            .unwrap();
        let payload = json!({ "transactionHash": "ABC" });

        let (a, b) = futures::join!(
            station.resolver.resolve(&first, true, &payload),
            station.resolver.resolve(&second, true, &payload)
        );
        assert_eq!(a.unwrap(), Resolution::Success);
        assert_eq!(b.unwrap(), Resolution::Success);

        let jobs = station.queue.pending().await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].address, "A");
    }
}
