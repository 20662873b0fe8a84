//! NFT flows: login, mint, draft records, direct-signature verification

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::addressbook::AddressBook;
use crate::callback::{CallbackResolver, Resolution};
use crate::config::LedgerConfig;
use crate::error::{Result, ServiceError};
use crate::ledger::{LedgerClient, NftMetadata};
use crate::qr::{QrIssuer, SignQr};
use crate::request::{RequestLedger, RequestView};
use crate::storage::{KeySpace, Store};

/// Off-chain record of an NFT from mint QR to confirmed mint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NftDraft {
    pub dapp_nft_id: String,
    /// On-chain id, known once the mint callback arrives
    pub nft_id: String,
    pub name: String,
    pub description: String,
    pub token_uri: String,
    pub owner: String,
    pub transaction_hash: String,
    pub created_at: String,
}

impl NftDraft {
    fn fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("dappNftId", self.dapp_nft_id.clone()),
            ("nftId", self.nft_id.clone()),
            ("name", self.name.clone()),
            ("description", self.description.clone()),
            ("tokenUri", self.token_uri.clone()),
            ("owner", self.owner.clone()),
            ("transactionHash", self.transaction_hash.clone()),
            ("createdAt", self.created_at.clone()),
        ]
    }

    fn from_fields(mut fields: HashMap<String, String>) -> Self {
        let mut take = |name: &str| fields.remove(name).unwrap_or_default();
        Self {
            dapp_nft_id: take("dappNftId"),
            nft_id: take("nftId"),
            name: take("name"),
            description: take("description"),
            token_uri: take("tokenUri"),
            owner: take("owner"),
            transaction_hash: take("transactionHash"),
            created_at: take("createdAt"),
        }
    }
}

pub struct NftDrafts {
    store: Arc<dyn Store>,
    keys: KeySpace,
}

impl NftDrafts {
    pub fn new(store: Arc<dyn Store>, keys: KeySpace) -> Self {
        Self { store, keys }
    }

    pub async fn create(&self, draft: &NftDraft) -> Result<()> {
        let created = self
            .store
            .hash_create(&self.keys.nft(&draft.dapp_nft_id), &draft.fields(), None)
            .await?;
        if !created {
            return Err(ServiceError::InvalidInput(format!(
                "NFT draft {} already exists",
                draft.dapp_nft_id
            )));
        }
        Ok(())
    }

    pub async fn get(&self, dapp_nft_id: &str) -> Result<Option<NftDraft>> {
        let fields = self.store.hash_get_all(&self.keys.nft(dapp_nft_id)).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        Ok(Some(NftDraft::from_fields(fields)))
    }

    /// Attach the mint outcome to an existing draft. Returns false when the
    /// draft does not exist.
    pub async fn record_mint(
        &self,
        dapp_nft_id: &str,
        nft_id: Option<&str>,
        transaction_hash: &str,
    ) -> Result<bool> {
        let key = self.keys.nft(dapp_nft_id);
        if !self
            .store
            .hash_set_if_exists(&key, "transactionHash", transaction_hash)
            .await?
        {
            return Ok(false);
        }
        if let Some(nft_id) = nft_id {
            self.store.hash_set_if_exists(&key, "nftId", nft_id).await?;
        }
        Ok(true)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOutcome {
    pub request_key: String,
    pub signature: String,
    pub is_valid: bool,
}

pub struct NftService {
    issuer: Arc<QrIssuer>,
    requests: Arc<RequestLedger>,
    addressbook: Arc<AddressBook>,
    drafts: Arc<NftDrafts>,
    resolver: Arc<CallbackResolver>,
    ledger: Arc<dyn LedgerClient>,
    project_id: String,
    api_host: String,
}

impl NftService {
    pub fn new(
        issuer: Arc<QrIssuer>,
        requests: Arc<RequestLedger>,
        addressbook: Arc<AddressBook>,
        drafts: Arc<NftDrafts>,
        resolver: Arc<CallbackResolver>,
        ledger: Arc<dyn LedgerClient>,
        config: &LedgerConfig,
    ) -> Self {
        Self {
            issuer,
            requests,
            addressbook,
            drafts,
            resolver,
            ledger,
            project_id: config.project_id.clone(),
            api_host: config.api_host.trim_end_matches('/').to_string(),
        }
    }

    pub async fn login_qr(&self) -> Result<SignQr> {
        self.issuer.login().await
    }

    /// Upload the metadata, build the mint document for `signer` and issue a
    /// direct-sign QR for it
    pub async fn mint_qr(
        &self,
        signer: &str,
        image: &str,
        name: &str,
        description: &str,
    ) -> Result<SignQr> {
        if signer.is_empty() {
            return Err(ServiceError::InvalidInput("signer is required".to_string()));
        }
        if name.is_empty() {
            return Err(ServiceError::InvalidInput("nft name is required".to_string()));
        }

        let pubkey = self
            .addressbook
            .pubkey(signer)
            .await?
            .ok_or_else(|| ServiceError::UnknownSigner(signer.to_string()))?;

        let dapp_nft_id = uuid::Uuid::new_v4().simple().to_string();
        let metadata = NftMetadata {
            name: name.to_string(),
            description: description.to_string(),
            identity: self.project_id.clone(),
            meta_uri: format!("{}/nft/{}", self.api_host, dapp_nft_id),
        };
        let token_uri = self.ledger.upload_nft_metadata(image, &metadata).await?;
        let document = self
            .ledger
            .build_mint_document(signer, &pubkey, &token_uri)
            .await?;

        self.drafts
            .create(&NftDraft {
                dapp_nft_id: dapp_nft_id.clone(),
                nft_id: String::new(),
                name: name.to_string(),
                description: description.to_string(),
                token_uri,
                owner: signer.to_string(),
                transaction_hash: String::new(),
                created_at: Utc::now().to_rfc3339(),
            })
            .await?;

        let qr = self.issuer.mint(signer, &document, &dapp_nft_id).await?;
        info!("Mint draft {} for {}", dapp_nft_id, signer);
        Ok(qr)
    }

    pub async fn status(&self, request_key: &str) -> Result<RequestView> {
        self.requests.get(request_key).await
    }

    pub async fn nft(&self, dapp_nft_id: &str) -> Result<Option<NftDraft>> {
        self.drafts.get(dapp_nft_id).await
    }

    pub async fn callback(
        &self,
        request_key: &str,
        approved: bool,
        sign_data: &Value,
    ) -> Result<Resolution> {
        self.resolver.resolve(request_key, approved, sign_data).await
    }

    /// Check a direct signature against the document of the request. Any
    /// failure reads as invalid.
    pub async fn verify(&self, request_key: &str, signature: &str) -> VerifyOutcome {
        let is_valid = match self.requests.find(request_key).await {
            Ok(Some(request)) => self
                .ledger
                .verify_direct_signature(&request.signer, signature, &request.message)
                .await
                .unwrap_or_else(|e| {
                    warn!("Direct signature check for {} failed: {}", request_key, e);
                    false
                }),
            Ok(None) => false,
            Err(e) => {
                warn!("Could not load request {}: {}", request_key, e);
                false
            }
        };

        VerifyOutcome {
            request_key: request_key.to_string(),
            signature: signature.to_string(),
            is_valid,
        }
    }
}
