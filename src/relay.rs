//! HTTP ledger client
//!
//! Talks to two services:
//! - the wallet relay, which authenticates the project and issues pairing
//!   payloads for arbitrary and direct sign requests
//! - the ledger gateway, which holds the payout wallet and performs chain
//!   work: signature verification, sign document building, metadata upload
//!   and bank transfers
//!
//! Both answer with the `{code, message, result}` envelope, `code == 0`
//! meaning success.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::config::LedgerConfig;
use crate::ledger::{
    LedgerClient, LedgerError, NftMetadata, PairingPayload, PairingSession, TransferReceipt,
};

const QR_TYPE_SIGN: u8 = 0;
const SIGN_TYPE_ARBITRARY: u8 = 0;
const SIGN_TYPE_DIRECT: u8 = 1;

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: i64,
    #[serde(default)]
    message: String,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthResult {
    project_key: String,
}

#[derive(Debug, Deserialize)]
struct QrResult {
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyResult {
    is_valid: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenUriResult {
    token_uri: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignDocResult {
    sign_doc: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SignRequestBody<'a> {
    qr_type: u8,
    #[serde(rename = "type")]
    sign_type: u8,
    signer: &'a str,
    message: &'a str,
    info: &'a str,
    argument: serde_json::Value,
    is_multiple: bool,
}

pub struct HttpLedgerClient {
    client: Client,
    relay_url: String,
    gateway_url: String,
}

impl HttpLedgerClient {
    pub fn new(config: &LedgerConfig) -> Self {
        // Build HTTP client with timeout, falling back to default client if builder fails
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            relay_url: config.relay_url.trim_end_matches('/').to_string(),
            gateway_url: config.gateway_url.trim_end_matches('/').to_string(),
        }
    }

    fn relay_endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.relay_url, path.trim_start_matches('/'))
    }

    fn gateway_endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.gateway_url, path.trim_start_matches('/'))
    }

    async fn post<B, T>(&self, url: &str, body: &B, bearer: Option<&str>) -> Result<T, LedgerError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!("POST {}", url);

        let mut request = self.client.post(url).json(body);
        if let Some(token) = bearer {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        let response = request
            .send()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(LedgerError::Transport(format!("{} {}: {}", url, status, text)));
        }

        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| LedgerError::InvalidResponse(e.to_string()))?;

        if envelope.code != 0 {
            return Err(LedgerError::Rejected(format!(
                "code {}: {}",
                envelope.code, envelope.message
            )));
        }

        envelope
            .result
            .ok_or_else(|| LedgerError::InvalidResponse(format!("{} returned no result", url)))
    }

    async fn request_sign(
        &self,
        session: &PairingSession,
        body: &SignRequestBody<'_>,
    ) -> Result<PairingPayload, LedgerError> {
        let url = self.relay_endpoint("/v1/projects/sign");
        let result: QrResult = self.post(&url, body, Some(&session.project_key)).await?;
        Ok(PairingPayload(result.data))
    }
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    async fn create_pairing_session(&self, secret: &str) -> Result<PairingSession, LedgerError> {
        let url = self.relay_endpoint("/v1/projects/auth");
        let result: AuthResult = self
            .post(&url, &json!({ "projectSecretKey": secret }), None)
            .await?;
        Ok(PairingSession {
            project_key: result.project_key,
        })
    }

    async fn request_arbitrary_signature(
        &self,
        session: &PairingSession,
        message: &str,
        info: &str,
    ) -> Result<PairingPayload, LedgerError> {
        let body = SignRequestBody {
            qr_type: QR_TYPE_SIGN,
            sign_type: SIGN_TYPE_ARBITRARY,
            signer: "",
            message,
            info,
            argument: json!({}),
            is_multiple: false,
        };
        self.request_sign(session, &body).await
    }

    async fn request_direct_signature(
        &self,
        session: &PairingSession,
        signer: &str,
        document: &str,
        info: &str,
    ) -> Result<PairingPayload, LedgerError> {
        let body = SignRequestBody {
            qr_type: QR_TYPE_SIGN,
            sign_type: SIGN_TYPE_DIRECT,
            signer,
            message: document,
            info,
            argument: json!({}),
            is_multiple: false,
        };
        self.request_sign(session, &body).await
    }

    async fn verify_arbitrary_signature(
        &self,
        raw_signed_data: &str,
        message: &str,
    ) -> Result<bool, LedgerError> {
        let url = self.gateway_endpoint("/v1/verify/arbitrary");
        let result: VerifyResult = self
            .post(
                &url,
                &json!({ "rawData": raw_signed_data, "message": message }),
                None,
            )
            .await?;
        Ok(result.is_valid)
    }

    async fn verify_direct_signature(
        &self,
        address: &str,
        signature: &str,
        document: &str,
    ) -> Result<bool, LedgerError> {
        let url = self.gateway_endpoint("/v1/verify/direct");
        let result: VerifyResult = self
            .post(
                &url,
                &json!({ "address": address, "signature": signature, "signDoc": document }),
                None,
            )
            .await?;
        Ok(result.is_valid)
    }

    async fn submit_transfer(
        &self,
        source_wallet: &str,
        destination: &str,
        amount: &str,
    ) -> Result<TransferReceipt, LedgerError> {
        let url = self.gateway_endpoint("/v1/bank/send");
        self.post(
            &url,
            &json!({ "wallet": source_wallet, "to": destination, "amount": amount }),
            None,
        )
        .await
    }

    async fn upload_nft_metadata(
        &self,
        image: &str,
        metadata: &NftMetadata,
    ) -> Result<String, LedgerError> {
        let url = self.gateway_endpoint("/v1/ipfs/nft");
        let result: TokenUriResult = self
            .post(&url, &json!({ "image": image, "metadata": metadata }), None)
            .await?;
        Ok(result.token_uri)
    }

    async fn build_mint_document(
        &self,
        owner: &str,
        pubkey: &str,
        token_uri: &str,
    ) -> Result<String, LedgerError> {
        let url = self.gateway_endpoint("/v1/nft/sign-doc");
        let result: SignDocResult = self
            .post(
                &url,
                &json!({ "owner": owner, "pubkey": pubkey, "tokenURI": token_uri }),
                None,
            )
            .await?;
        Ok(result.sign_doc)
    }
}
