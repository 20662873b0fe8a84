//! Scripted fakes shared by the unit tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::config::Config;
use crate::ledger::{
    LedgerClient, LedgerError, NftMetadata, PairingPayload, PairingSession, TransferReceipt,
};
use crate::notify::NotificationSink;
use crate::station::Station;
use crate::storage::MemoryStore;

/// Fully wired station over an in-memory store with the default config
pub fn station() -> (Station, Arc<FakeLedger>, Arc<RecordingNotifier>) {
    let ledger = Arc::new(FakeLedger::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let station = Station::new(
        &Config::default(),
        Arc::new(MemoryStore::new()),
        ledger.clone(),
        notifier.clone(),
    );
    (station, ledger, notifier)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub wallet: String,
    pub to: String,
    pub amount: String,
}

/// Ledger client with scripted answers. Verification answers `true` and
/// transfers succeed unless told otherwise.
pub struct FakeLedger {
    pairings: AtomicUsize,
    verify: Mutex<Result<bool, LedgerError>>,
    receipts: Mutex<VecDeque<Result<TransferReceipt, LedgerError>>>,
    transfers: Mutex<Vec<Transfer>>,
    uploads: Mutex<Vec<NftMetadata>>,
    direct_requests: Mutex<Vec<String>>,
}

impl Default for FakeLedger {
    fn default() -> Self {
        Self {
            pairings: AtomicUsize::new(0),
            verify: Mutex::new(Ok(true)),
            receipts: Mutex::new(VecDeque::new()),
            transfers: Mutex::new(Vec::new()),
            uploads: Mutex::new(Vec::new()),
            direct_requests: Mutex::new(Vec::new()),
        }
    }
}

impl FakeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_verify(&self, answer: Result<bool, LedgerError>) {
        *self.verify.lock() = answer;
    }

    /// Queue the answer for the next transfer
    pub fn push_receipt(&self, receipt: Result<TransferReceipt, LedgerError>) {
        self.receipts.lock().push_back(receipt);
    }

    pub fn reject_next_transfer(&self, code: i64) {
        self.push_receipt(Ok(TransferReceipt {
            code,
            transaction_hash: String::new(),
            raw_log: "insufficient funds".to_string(),
        }));
    }

    pub fn transfers(&self) -> Vec<Transfer> {
        self.transfers.lock().clone()
    }

    pub fn uploads(&self) -> Vec<NftMetadata> {
        self.uploads.lock().clone()
    }

    pub fn direct_requests(&self) -> Vec<String> {
        self.direct_requests.lock().clone()
    }

    fn next_payload(&self) -> PairingPayload {
        let n = self.pairings.fetch_add(1, Ordering::SeqCst);
        PairingPayload(format!("sign://token{}", n))
    }
}

#[async_trait]
impl LedgerClient for FakeLedger {
    async fn create_pairing_session(&self, secret: &str) -> Result<PairingSession, LedgerError> {
        Ok(PairingSession {
            project_key: format!("pk-{}", secret),
        })
    }

    async fn request_arbitrary_signature(
        &self,
        _session: &PairingSession,
        _message: &str,
        _info: &str,
    ) -> Result<PairingPayload, LedgerError> {
        Ok(self.next_payload())
    }

    async fn request_direct_signature(
        &self,
        _session: &PairingSession,
        signer: &str,
        _document: &str,
        _info: &str,
    ) -> Result<PairingPayload, LedgerError> {
        self.direct_requests.lock().push(signer.to_string());
        Ok(self.next_payload())
    }

    async fn verify_arbitrary_signature(
        &self,
        _raw_signed_data: &str,
        _message: &str,
    ) -> Result<bool, LedgerError> {
        self.verify.lock().clone()
    }

    async fn verify_direct_signature(
        &self,
        _address: &str,
        _signature: &str,
        _document: &str,
    ) -> Result<bool, LedgerError> {
        self.verify.lock().clone()
    }

    async fn submit_transfer(
        &self,
        source_wallet: &str,
        destination: &str,
        amount: &str,
    ) -> Result<TransferReceipt, LedgerError> {
        let n = {
            let mut transfers = self.transfers.lock();
            transfers.push(Transfer {
                wallet: source_wallet.to_string(),
                to: destination.to_string(),
                amount: amount.to_string(),
            });
            transfers.len()
        };
        self.receipts.lock().pop_front().unwrap_or_else(|| {
            Ok(TransferReceipt {
                code: 0,
                transaction_hash: format!("TX{}", n),
                raw_log: String::new(),
            })
        })
    }

    async fn upload_nft_metadata(
        &self,
        _image: &str,
        metadata: &NftMetadata,
    ) -> Result<String, LedgerError> {
        self.uploads.lock().push(metadata.clone());
        Ok(format!("ipfs://{}", metadata.name))
    }

    async fn build_mint_document(
        &self,
        owner: &str,
        _pubkey: &str,
        token_uri: &str,
    ) -> Result<String, LedgerError> {
        Ok(format!("mint:{}:{}", owner, token_uri))
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingNotifier {
    async fn notify(&self, message: &str) {
        self.messages.lock().push(message.to_string());
    }
}
