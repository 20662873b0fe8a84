//! Ledger client capability
//!
//! Everything that touches the wallet relay or the chain goes through
//! [`LedgerClient`]: pairing sessions, QR sign requests, signature
//! verification, NFT metadata upload and payout transfers. The service never
//! interprets signatures or transactions itself.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Scheme the relay puts in front of pairing payloads
pub const PAIRING_SCHEME: &str = "sign://";

#[derive(Debug, Clone, thiserror::Error)]
pub enum LedgerError {
    #[error("ledger transport error: {0}")]
    Transport(String),
    #[error("ledger rejected request: {0}")]
    Rejected(String),
    #[error("unexpected ledger response: {0}")]
    InvalidResponse(String),
}

/// Authenticated session with the relay
#[derive(Debug, Clone)]
pub struct PairingSession {
    pub project_key: String,
}

/// Opaque string handed to the wallet app, `sign://<token>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingPayload(pub String);

impl PairingPayload {
    /// Correlation token carried by the payload
    pub fn token(&self) -> &str {
        self.0.strip_prefix(PAIRING_SCHEME).unwrap_or(&self.0)
    }

    /// Payload with its scheme rewritten for the station app
    pub fn with_identity(&self, identity: &str) -> String {
        format!("{}://{}", identity, self.token())
    }
}

/// Outcome of a transfer submission. A nonzero code means the chain
/// rejected the transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferReceipt {
    pub code: i64,
    #[serde(default)]
    pub transaction_hash: String,
    #[serde(default)]
    pub raw_log: String,
}

impl TransferReceipt {
    pub fn is_success(&self) -> bool {
        self.code == 0
    }
}

/// Metadata uploaded for an NFT before it is minted
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NftMetadata {
    pub name: String,
    pub description: String,
    /// Project identity recorded in the token metadata
    pub identity: String,
    /// Link back to this service's draft record
    #[serde(rename = "metaURI")]
    pub meta_uri: String,
}

#[async_trait]
pub trait LedgerClient: Send + Sync + 'static {
    async fn create_pairing_session(&self, secret: &str) -> Result<PairingSession, LedgerError>;

    async fn request_arbitrary_signature(
        &self,
        session: &PairingSession,
        message: &str,
        info: &str,
    ) -> Result<PairingPayload, LedgerError>;

    async fn request_direct_signature(
        &self,
        session: &PairingSession,
        signer: &str,
        document: &str,
        info: &str,
    ) -> Result<PairingPayload, LedgerError>;

    /// Check a wallet's arbitrary-message signature (raw signed data as
    /// returned by the wallet) against the message it was asked to sign
    async fn verify_arbitrary_signature(
        &self,
        raw_signed_data: &str,
        message: &str,
    ) -> Result<bool, LedgerError>;

    async fn verify_direct_signature(
        &self,
        address: &str,
        signature: &str,
        document: &str,
    ) -> Result<bool, LedgerError>;

    async fn submit_transfer(
        &self,
        source_wallet: &str,
        destination: &str,
        amount: &str,
    ) -> Result<TransferReceipt, LedgerError>;

    /// Store the image and metadata, returning the token URI
    async fn upload_nft_metadata(
        &self,
        image: &str,
        metadata: &NftMetadata,
    ) -> Result<String, LedgerError>;

    /// Build the serialized sign document for minting `token_uri` to `owner`
    async fn build_mint_document(
        &self,
        owner: &str,
        pubkey: &str,
        token_uri: &str,
    ) -> Result<String, LedgerError>;
}

/// Read the signer public key out of a wallet's raw arbitrary-sign data
pub fn pubkey_from_raw_signed_data(raw: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(raw).ok()?;
    match value.get("pubkey")? {
        serde_json::Value::String(s) => Some(s.clone()),
        // Some wallets nest it as {"type": ..., "value": ...}
        serde_json::Value::Object(o) => o.get("value")?.as_str().map(str::to_string),
        _ => None,
    }
}
