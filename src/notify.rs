//! Payout notifications
//!
//! Notifications are fire-and-forget: delivery failures are logged here and
//! never reach the caller.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};

use crate::config::NotifyConfig;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

#[async_trait]
pub trait NotificationSink: Send + Sync + 'static {
    async fn notify(&self, message: &str);
}

/// Sends messages to a Telegram chat through the bot API
pub struct TelegramNotifier {
    client: reqwest::Client,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
        }
    }

    fn send_message_url(&self) -> String {
        format!("{}/bot{}/sendMessage", TELEGRAM_API_BASE, self.bot_token)
    }
}

#[async_trait]
impl NotificationSink for TelegramNotifier {
    async fn notify(&self, message: &str) {
        let body = json!({
            "chat_id": self.chat_id,
            "text": message,
            "disable_web_page_preview": true,
        });

        match self.client.post(self.send_message_url()).json(&body).send().await {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => {
                warn!("Telegram notification rejected: {}", response.status());
            }
            Err(e) => {
                warn!("Telegram notification failed: {}", redact(e));
            }
        }
    }
}

/// The request URL carries the bot token; keep it out of the logs
fn redact(e: reqwest::Error) -> reqwest::Error {
    e.without_url()
}

/// Writes notifications to the log only
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn notify(&self, message: &str) {
        info!("[notify] {}", message);
    }
}

/// Telegram when both token and chat are configured, the log otherwise
pub fn from_config(config: &NotifyConfig) -> Arc<dyn NotificationSink> {
    if config.bot_token.is_empty() || config.chat_id.is_empty() {
        warn!("Telegram not configured - payout notifications go to the log only");
        Arc::new(LogNotifier)
    } else {
        Arc::new(TelegramNotifier::new(
            config.bot_token.clone(),
            config.chat_id.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_message_url() {
        let notifier = TelegramNotifier::new("123:abc", "-100");
        assert_eq!(
            notifier.send_message_url(),
            "https://api.telegram.org/bot123:abc/sendMessage"
        );
    }

    #[tokio::test]
    async fn test_send_errors_hide_the_token() {
        let client = reqwest::Client::new();
        let err = client
            .post("http://127.0.0.1:9/bot123:SECRETTOKEN/sendMessage")
            .send()
            .await
            .unwrap_err();
        assert!(err.to_string().contains("SECRETTOKEN"));
        assert!(!redact(err).to_string().contains("SECRETTOKEN"));
    }

    #[tokio::test]
    async fn test_log_notifier_never_fails() {
        LogNotifier.notify("hello").await;
    }
}
