//! Sign Station API client
//!
//! Reads go through the server's public routes and unwrap the
//! `{code, message, result}` envelope.

use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sign_station::gallery::{MyGallery, NftList};
use sign_station::request::RequestView;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct Envelope {
    code: i32,
    #[serde(default)]
    message: String,
    #[serde(default)]
    result: serde_json::Value,
}

pub struct StationClient {
    client: Client,
    base_url: String,
}

impl StationClient {
    pub fn new(base_url: &str) -> Self {
        // Build HTTP client with timeout, falling back to default client if builder fails
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        let resp = self.client.get(&url).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let error_text = resp.text().await.unwrap_or_else(|_| "Unknown error".into());
            return Err(anyhow!("Request failed ({}): {}", status, error_text));
        }

        let envelope: Envelope = resp.json().await?;
        if envelope.code != 0 {
            return Err(anyhow!("Server answered {}: {}", envelope.code, envelope.message));
        }
        serde_json::from_value(envelope.result)
            .map_err(|e| anyhow!("Unexpected result for {}: {}", path, e))
    }

    /// Status of a sign request, polled through the NFT or gallery route
    pub async fn request_status(&self, request_key: &str, gallery: bool) -> Result<RequestView> {
        let scope = if gallery { "gallery" } else { "nft" };
        self.get(&format!(
            "{}/requests/{}",
            scope,
            urlencoding::encode(request_key)
        ))
        .await
    }

    pub async fn latest(&self, featured: bool) -> Result<NftList> {
        if featured {
            self.get("gallery/latest/featured").await
        } else {
            self.get("gallery/latest").await
        }
    }

    pub async fn gallery(&self, address: &str) -> Result<MyGallery> {
        self.get(&format!("gallery/{}", urlencoding::encode(address)))
            .await
    }
}
