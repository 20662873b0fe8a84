//! Sign request ledger
//!
//! A sign request is a hash at `request:<key>` that lives for the configured
//! TTL. Its status only ever leaves PENDING once: every transition is a
//! compare-and-set from PENDING on the stored field, so concurrent callbacks
//! for the same key produce exactly one winner and a terminal status can
//! never be overwritten.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, ServiceError};
use crate::storage::{KeySpace, Store, StoreError};

const MAX_KEY_LEN: usize = 256;

const FIELD_TYPE: &str = "type";
const FIELD_MESSAGE: &str = "message";
const FIELD_STATUS: &str = "status";
const FIELD_SIGNER: &str = "signer";
const FIELD_SIGN_DATA: &str = "signData";
const FIELD_EXTRA: &str = "extra";
const FIELD_ADDED_AT: &str = "addedAt";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RequestKind {
    Login,
    Mint,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::Login => "LOGIN",
            RequestKind::Mint => "MINT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "LOGIN" => Some(RequestKind::Login),
            "MINT" => Some(RequestKind::Mint),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Pending,
    Success,
    Failed,
    Invalid,
}

impl RequestStatus {
    pub fn code(&self) -> i32 {
        match self {
            RequestStatus::Pending => 0,
            RequestStatus::Success => 1,
            RequestStatus::Failed => -1,
            RequestStatus::Invalid => -2,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(RequestStatus::Pending),
            1 => Some(RequestStatus::Success),
            -1 => Some(RequestStatus::Failed),
            -2 => Some(RequestStatus::Invalid),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }

    /// PENDING moves to any terminal status; terminal statuses never move
    pub fn can_transition_to(&self, next: RequestStatus) -> bool {
        *self == RequestStatus::Pending && next.is_terminal()
    }
}

/// Outcome of a status change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied,
    /// The request already had the requested status
    Unchanged,
    /// The request is in a different terminal status
    Refused { current: RequestStatus },
    /// Expired or never existed
    Missing,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignRequest {
    pub key: String,
    pub kind: RequestKind,
    pub message: String,
    pub status: RequestStatus,
    pub signer: String,
    pub sign_data: String,
    pub extra: String,
    pub added_at: String,
}

impl SignRequest {
    fn from_fields(key: &str, storage_key: &str, mut fields: HashMap<String, String>) -> Result<Self> {
        let corrupt = |reason: String| StoreError::Corrupt {
            key: storage_key.to_string(),
            reason,
        };

        let kind_raw = fields.remove(FIELD_TYPE).unwrap_or_default();
        let kind = RequestKind::parse(&kind_raw)
            .ok_or_else(|| corrupt(format!("unknown request type {:?}", kind_raw)))?;

        let status_raw = fields.remove(FIELD_STATUS).unwrap_or_default();
        let status = status_raw
            .parse::<i32>()
            .ok()
            .and_then(RequestStatus::from_code)
            .ok_or_else(|| corrupt(format!("unknown status {:?}", status_raw)))?;

        Ok(Self {
            key: key.to_string(),
            kind,
            message: fields.remove(FIELD_MESSAGE).unwrap_or_default(),
            status,
            signer: fields.remove(FIELD_SIGNER).unwrap_or_default(),
            sign_data: fields.remove(FIELD_SIGN_DATA).unwrap_or_default(),
            extra: fields.remove(FIELD_EXTRA).unwrap_or_default(),
            added_at: fields.remove(FIELD_ADDED_AT).unwrap_or_default(),
        })
    }
}

/// What status lookups return. A missing request reads as status -1 with
/// empty fields rather than an error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RequestView {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    pub status: i32,
    pub signer: String,
    pub sign_data: String,
    pub extra: String,
    pub added_at: String,
}

impl RequestView {
    pub fn not_found() -> Self {
        Self {
            kind: String::new(),
            message: String::new(),
            status: RequestStatus::Failed.code(),
            signer: String::new(),
            sign_data: String::new(),
            extra: String::new(),
            added_at: String::new(),
        }
    }
}

impl From<SignRequest> for RequestView {
    fn from(request: SignRequest) -> Self {
        Self {
            kind: request.kind.as_str().to_string(),
            message: request.message,
            status: request.status.code(),
            signer: request.signer,
            sign_data: request.sign_data,
            extra: request.extra,
            added_at: request.added_at,
        }
    }
}

/// Fresh unguessable correlation key
pub fn generate_request_key() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

pub fn validate_request_key(key: &str) -> Result<()> {
    if key.is_empty() || key.len() > MAX_KEY_LEN || key.chars().any(char::is_whitespace) {
        return Err(ServiceError::InvalidInput(format!(
            "malformed request key {:?}",
            key
        )));
    }
    Ok(())
}

pub struct RequestLedger {
    store: Arc<dyn Store>,
    keys: KeySpace,
    ttl: Duration,
}

impl RequestLedger {
    pub fn new(store: Arc<dyn Store>, keys: KeySpace, ttl: Duration) -> Self {
        Self { store, keys, ttl }
    }

    /// Open a request under a freshly generated key
    pub async fn open(
        &self,
        kind: RequestKind,
        message: &str,
        signer: &str,
        extra: &str,
    ) -> Result<String> {
        let key = generate_request_key();
        self.open_keyed(&key, kind, message, signer, extra).await?;
        Ok(key)
    }

    /// Open a request under a key minted elsewhere (the relay's pairing token)
    pub async fn open_keyed(
        &self,
        key: &str,
        kind: RequestKind,
        message: &str,
        signer: &str,
        extra: &str,
    ) -> Result<()> {
        validate_request_key(key)?;

        let added_at = Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let fields = [
            (FIELD_TYPE, kind.as_str().to_string()),
            (FIELD_MESSAGE, message.to_string()),
            (FIELD_STATUS, RequestStatus::Pending.code().to_string()),
            (FIELD_SIGNER, signer.to_string()),
            (FIELD_SIGN_DATA, String::new()),
            (FIELD_EXTRA, extra.to_string()),
            (FIELD_ADDED_AT, added_at),
        ];

        let created = self
            .store
            .hash_create(&self.keys.request(key), &fields, Some(self.ttl))
            .await?;
        if !created {
            return Err(ServiceError::DuplicateRequestKey);
        }

        debug!("Opened {} request {}", kind.as_str(), key);
        Ok(())
    }

    pub async fn find(&self, key: &str) -> Result<Option<SignRequest>> {
        let storage_key = self.keys.request(key);
        let fields = self.store.hash_get_all(&storage_key).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        SignRequest::from_fields(key, &storage_key, fields).map(Some)
    }

    /// Current state, with not-found reported as status -1
    pub async fn get(&self, key: &str) -> Result<RequestView> {
        if validate_request_key(key).is_err() {
            return Ok(RequestView::not_found());
        }
        Ok(self
            .find(key)
            .await?
            .map(RequestView::from)
            .unwrap_or_else(RequestView::not_found))
    }

    pub async fn set_status(&self, key: &str, next: RequestStatus) -> Result<Transition> {
        self.transition(key, next, &[]).await
    }

    /// Bind `address` as the signer while moving the request to SUCCESS, in
    /// one store step. A request that did not succeed never gets a signer.
    pub async fn bind_signer(&self, key: &str, address: &str) -> Result<Transition> {
        self.transition(
            key,
            RequestStatus::Success,
            &[(FIELD_SIGNER, address.to_string())],
        )
        .await
    }

    async fn transition(
        &self,
        key: &str,
        next: RequestStatus,
        also: &[(&str, String)],
    ) -> Result<Transition> {
        let storage_key = self.keys.request(key);

        if RequestStatus::Pending.can_transition_to(next) {
            let mut updates = vec![(FIELD_STATUS, next.code().to_string())];
            updates.extend_from_slice(also);
            let applied = self
                .store
                .hash_compare_and_set(
                    &storage_key,
                    FIELD_STATUS,
                    &RequestStatus::Pending.code().to_string(),
                    &updates,
                )
                .await?;
            if applied {
                debug!("Request {} -> {:?}", key, next);
                return Ok(Transition::Applied);
            }
        }

        let current = self
            .store
            .hash_get(&storage_key, FIELD_STATUS)
            .await?
            .and_then(|s| s.parse::<i32>().ok())
            .and_then(RequestStatus::from_code);

        let outcome = match current {
            None => Transition::Missing,
            Some(current) if current == next => Transition::Unchanged,
            Some(current) => Transition::Refused { current },
        };
        if let Transition::Refused { current } = outcome {
            warn!(
                "Refused status change for request {}: {:?} -> {:?}",
                key, current, next
            );
        }
        Ok(outcome)
    }

    pub async fn record_signature(&self, key: &str, sign_data: &str) -> Result<bool> {
        Ok(self
            .store
            .hash_set_if_exists(&self.keys.request(key), FIELD_SIGN_DATA, sign_data)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use tokio_test::{assert_err, assert_ok};

    const TTL: Duration = Duration::from_secs(60);

    fn ledger() -> RequestLedger {
        RequestLedger::new(Arc::new(MemoryStore::new()), KeySpace::default(), TTL)
    }

    const ALL: [RequestStatus; 4] = [
        RequestStatus::Pending,
        RequestStatus::Success,
        RequestStatus::Failed,
        RequestStatus::Invalid,
    ];

    #[test]
    fn test_status_codes() {
        for status in ALL {
            assert_eq!(RequestStatus::from_code(status.code()), Some(status));
        }
        assert_eq!(RequestStatus::from_code(7), None);
    }

    #[test]
    fn test_transition_rules() {
        for from in ALL {
            for to in ALL {
                let expected = from == RequestStatus::Pending && to != RequestStatus::Pending;
                assert_eq!(from.can_transition_to(to), expected, "{:?} -> {:?}", from, to);
            }
        }
    }

    #[test]
    fn test_generated_keys_are_distinct() {
        let a = generate_request_key();
        let b = generate_request_key();
        assert_ne!(a, b);
        assert_eq!(a.len(), 32);
        assert_ok!(validate_request_key(&a));
        assert_err!(validate_request_key(""));
        assert_err!(validate_request_key("has space"));
    }

    #[tokio::test]
    async fn test_open_and_get() {
        let ledger = ledger();
        let key = ledger
            .open(RequestKind::Login, "m1", "", "")
            .await
            .unwrap();

        let view = ledger.get(&key).await.unwrap();
        assert_eq!(view.status, 0);
        assert_eq!(view.kind, "LOGIN");
        assert_eq!(view.message, "m1");
        assert!(view.signer.is_empty());
        assert_eq!(view.added_at.len(), 19);
    }

    #[tokio::test]
    async fn test_unknown_key_reads_as_failed() {
        let ledger = ledger();
        assert_eq!(ledger.get("nope").await.unwrap(), RequestView::not_found());
        assert_eq!(ledger.get("").await.unwrap().status, -1);
        assert!(ledger.find("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_key_rejected() {
        let ledger = ledger();
        ledger
            .open_keyed("k1", RequestKind::Login, "m", "", "")
            .await
            .unwrap();
        let err = ledger
            .open_keyed("k1", RequestKind::Mint, "m", "", "")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::DuplicateRequestKey));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_request_reads_as_not_found() {
        let ledger = ledger();
        ledger
            .open_keyed("k1", RequestKind::Login, "m1", "", "")
            .await
            .unwrap();
        assert_eq!(
            ledger.set_status("k1", RequestStatus::Success).await.unwrap(),
            Transition::Applied
        );
        assert_eq!(ledger.get("k1").await.unwrap().status, 1);

        tokio::time::advance(TTL + Duration::from_secs(1)).await;

        assert_eq!(ledger.get("k1").await.unwrap(), RequestView::not_found());
        // Mutations after expiry are silent no-ops and do not resurrect the record.
        assert!(!ledger.record_signature("k1", "{}").await.unwrap());
        assert_eq!(
            ledger.bind_signer("k1", "addr").await.unwrap(),
            Transition::Missing
        );
        assert_eq!(
            ledger.set_status("k1", RequestStatus::Invalid).await.unwrap(),
            Transition::Missing
        );
        assert!(ledger.find("k1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_terminal_status_never_moves() {
        let ledger = ledger();
        for first in [
            RequestStatus::Success,
            RequestStatus::Failed,
            RequestStatus::Invalid,
        ] {
            let key = ledger.open(RequestKind::Mint, "doc", "", "").await.unwrap();
            assert_eq!(
                ledger.set_status(&key, first).await.unwrap(),
                Transition::Applied
            );
            for next in ALL {
                let outcome = ledger.set_status(&key, next).await.unwrap();
                if next == first {
                    assert_eq!(outcome, Transition::Unchanged);
                } else {
                    assert_eq!(outcome, Transition::Refused { current: first });
                }
                assert_eq!(ledger.get(&key).await.unwrap().status, first.code());
            }
        }
    }

    #[tokio::test]
    async fn test_signer_bound_once_on_success() {
        let ledger = ledger();
        let key = ledger.open(RequestKind::Login, "m", "", "").await.unwrap();

        assert_eq!(
            ledger.bind_signer(&key, "addr1").await.unwrap(),
            Transition::Applied
        );
        assert_eq!(
            ledger.bind_signer(&key, "addr2").await.unwrap(),
            Transition::Unchanged
        );
        let view = ledger.get(&key).await.unwrap();
        assert_eq!(view.status, 1);
        assert_eq!(view.signer, "addr1");
    }

    #[tokio::test]
    async fn test_rejected_request_never_gets_signer() {
        let ledger = ledger();
        let key = ledger.open(RequestKind::Login, "m", "", "").await.unwrap();

        // The rejection lands after verification, before completion.
        assert_eq!(
            ledger.set_status(&key, RequestStatus::Invalid).await.unwrap(),
            Transition::Applied
        );
        assert_eq!(
            ledger.bind_signer(&key, "addr1").await.unwrap(),
            Transition::Refused {
                current: RequestStatus::Invalid
            }
        );
        let view = ledger.get(&key).await.unwrap();
        assert_eq!(view.status, -2);
        assert!(view.signer.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_record_is_an_error() {
        let store = Arc::new(MemoryStore::new());
        store.hash_set("request:bad", "type", "BURN").await.unwrap();
        store.hash_set("request:bad", "status", "0").await.unwrap();
        let ledger = RequestLedger::new(store, KeySpace::default(), TTL);

        let err = ledger.find("bad").await.unwrap_err();
        assert!(matches!(err, ServiceError::Store(StoreError::Corrupt { .. })));
    }
}
