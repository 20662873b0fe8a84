//! QR sign request issuing
//!
//! Opens a relay pairing session, asks for a sign request and persists the
//! matching PENDING request under the relay's token. The QR handed to the
//! client carries the station app scheme instead of the relay's.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{LedgerConfig, RequestConfig};
use crate::error::Result;
use crate::ledger::{LedgerClient, PairingPayload};
use crate::request::{RequestKind, RequestLedger};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignQr {
    pub request_key: String,
    pub qrcode: String,
}

pub struct QrIssuer {
    ledger: Arc<dyn LedgerClient>,
    requests: Arc<RequestLedger>,
    project_secret_key: String,
    login_info: String,
    mint_info: String,
    station_identity: String,
}

impl QrIssuer {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        requests: Arc<RequestLedger>,
        ledger_config: &LedgerConfig,
        request_config: &RequestConfig,
    ) -> Self {
        Self {
            ledger,
            requests,
            project_secret_key: ledger_config.project_secret_key.clone(),
            login_info: request_config.login_info.clone(),
            mint_info: request_config.mint_info.clone(),
            station_identity: request_config.station_identity.clone(),
        }
    }

    /// Arbitrary-sign QR over a fresh random challenge
    pub async fn login(&self) -> Result<SignQr> {
        let message = uuid::Uuid::new_v4().to_string();
        let session = self
            .ledger
            .create_pairing_session(&self.project_secret_key)
            .await?;
        let payload = self
            .ledger
            .request_arbitrary_signature(&session, &message, &self.login_info)
            .await?;

        self.open(payload, RequestKind::Login, &message, "", "")
            .await
    }

    /// Direct-sign QR for `document`, to be signed by `signer`
    pub async fn mint(&self, signer: &str, document: &str, extra: &str) -> Result<SignQr> {
        let session = self
            .ledger
            .create_pairing_session(&self.project_secret_key)
            .await?;
        let payload = self
            .ledger
            .request_direct_signature(&session, signer, document, &self.mint_info)
            .await?;

        self.open(payload, RequestKind::Mint, document, signer, extra)
            .await
    }

    async fn open(
        &self,
        payload: PairingPayload,
        kind: RequestKind,
        message: &str,
        signer: &str,
        extra: &str,
    ) -> Result<SignQr> {
        let request_key = payload.token().to_string();
        self.requests
            .open_keyed(&request_key, kind, message, signer, extra)
            .await?;

        info!("Issued {} QR {}", kind.as_str(), request_key);
        Ok(SignQr {
            qrcode: payload.with_identity(&self.station_identity),
            request_key,
        })
    }
}
