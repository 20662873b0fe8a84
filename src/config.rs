//! Configuration management
//!
//! Loads configuration from config.toml with support for:
//! - HTTP server binding and CORS origins
//! - Key-value store connection and key namespace
//! - Sign request expiry and wallet-facing messages
//! - Relay and ledger gateway endpoints
//! - Reward amount ranges per program
//! - Payout dispatcher and feed sizing
//!
//! The resulting [`Config`] is built once at startup and handed to each
//! component constructor.

use anyhow::{Context, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

/// Main configuration structure matching config.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub requests: RequestConfig,
    pub ledger: LedgerConfig,
    pub rewards: RewardsConfig,
    pub dispatcher: DispatcherConfig,
    pub feeds: FeedConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origins. Empty means any origin is accepted.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

/// Key-value store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub url: String,
    /// Prefix applied to every key, e.g. "station:".
    #[serde(default)]
    pub namespace: String,
}

/// Sign request lifecycle settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestConfig {
    /// Seconds a sign request stays readable after creation
    pub expire_secs: u64,
    /// Info line shown by the wallet for login requests
    pub login_info: String,
    /// Info line shown by the wallet for mint requests
    pub mint_info: String,
    /// Scheme written into QR payloads handed to the wallet app
    pub station_identity: String,
}

/// Relay and ledger gateway endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub relay_url: String,
    pub gateway_url: String,
    pub project_id: String,
    /// Public base URL of this service, used for NFT metadata links
    pub api_host: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Relay project secret (PROJECT_SECRET_KEY env var in practice)
    #[serde(default, skip_serializing)]
    pub project_secret_key: String,
}

fn default_timeout_secs() -> u64 {
    5
}

/// Inclusive-exclusive range a random reward amount is drawn from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AmountRange {
    pub min: f64,
    pub max: f64,
}

impl AmountRange {
    pub const fn fixed(amount: f64) -> Self {
        Self {
            min: amount,
            max: amount,
        }
    }

    /// Draw an amount and format it as a decimal string with six digits
    pub fn sample(&self) -> String {
        let amount = if self.max > self.min {
            rand::thread_rng().gen_range(self.min..self.max)
        } else {
            self.min
        };
        format!("{:.6}", amount)
    }
}

/// Rewards system configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardsConfig {
    pub mint: AmountRange,
    pub gallery: GalleryRewards,
}

/// Gallery reward tiers, selected by the submission code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GalleryRewards {
    pub featured: AmountRange,
    pub standard: AmountRange,
    pub hidden: AmountRange,
}

/// Payout dispatcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Sleep between polls of an empty queue, and after a failed cycle
    pub idle_interval_secs: u64,
    /// Wallet the ledger gateway pays rewards from
    pub source_wallet: String,
    pub explorer_host: String,
    pub token_symbol: String,
}

impl DispatcherConfig {
    pub fn idle_interval(&self) -> Duration {
        Duration::from_secs(self.idle_interval_secs)
    }
}

/// Leaderboard feed caps
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    pub gallery_cap: usize,
    pub featured_cap: usize,
}

/// Chat notification settings (token from TELEGRAM_BOT_TOKEN)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default)]
    pub chat_id: String,
    #[serde(default, skip_serializing)]
    pub bot_token: String,
}

impl Config {
    /// Load from specific path
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if path.exists() {
            let content = std::fs::read_to_string(path).context("Failed to read config file")?;
            toml::from_str(&content).context("Failed to parse config file")
        } else {
            // Use embedded default config
            toml::from_str(DEFAULT_CONFIG).context("Failed to parse default config")
        }
    }

    /// Environment variables take precedence over file values
    pub fn apply_env(&mut self) {
        if let Some(url) = non_empty_env("REDIS_URL") {
            self.store.url = url;
        }
        if let Some(host) = non_empty_env("STATION_HOST") {
            self.server.host = host;
        }
        if let Some(port) = non_empty_env("STATION_PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
        if let Some(secret) = non_empty_env("PROJECT_SECRET_KEY") {
            self.ledger.project_secret_key = secret;
        }
        if let Some(token) = non_empty_env("TELEGRAM_BOT_TOKEN") {
            self.notify.bot_token = token;
        }
        if let Some(chat_id) = non_empty_env("TELEGRAM_CHAT_ID") {
            self.notify.chat_id = chat_id;
        }
    }

    pub fn request_ttl(&self) -> Duration {
        Duration::from_secs(self.requests.expire_secs)
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}

impl Default for Config {
    fn default() -> Self {
        // The embedded default config is parsed by the tests below,
        // so the fallback only guards against a broken edit.
        toml::from_str(DEFAULT_CONFIG).unwrap_or_else(|_| Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
                allowed_origins: Vec::new(),
            },
            store: StoreConfig {
                url: "redis://127.0.0.1:6379".to_string(),
                namespace: String::new(),
            },
            requests: RequestConfig {
                expire_secs: 600,
                login_info: "Login to Sign Station".to_string(),
                mint_info: "Mint your NFT".to_string(),
                station_identity: "station".to_string(),
            },
            ledger: LedgerConfig {
                relay_url: "https://relay.example.com".to_string(),
                gateway_url: "http://127.0.0.1:4000".to_string(),
                project_id: "sign-station".to_string(),
                api_host: "http://127.0.0.1:3000".to_string(),
                timeout_secs: default_timeout_secs(),
                project_secret_key: String::new(),
            },
            rewards: RewardsConfig {
                mint: AmountRange::fixed(2.0),
                gallery: GalleryRewards {
                    featured: AmountRange { min: 19.0, max: 20.0 },
                    standard: AmountRange { min: 17.0, max: 19.0 },
                    hidden: AmountRange { min: 15.0, max: 17.0 },
                },
            },
            dispatcher: DispatcherConfig {
                idle_interval_secs: 3,
                source_wallet: "airdrop".to_string(),
                explorer_host: "https://explorer.example.com".to_string(),
                token_symbol: "FCT".to_string(),
            },
            feeds: FeedConfig {
                gallery_cap: 8,
                featured_cap: 300,
            },
            notify: NotifyConfig::default(),
        })
    }
}
