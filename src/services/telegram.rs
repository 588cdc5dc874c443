// Telegram Bot API transport. Everything the publisher needs goes through
// the Channel trait so tests can swap in a fake; the concrete client talks
// to the HTTP API with reqwest.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::app_config::TelegramConfig;
use crate::utils::markdown::truncate_markdown_v2;

/// Telegram caps photo captions at 1024 characters.
pub const MAX_CAPTION_LEN: usize = 1024;

#[derive(Error, Debug)]
pub enum TelegramError {
    #[error("Telegram request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Telegram API error {code}: {description}")]
    Api { code: i64, description: String },
    #[error("Unexpected Telegram response: {0}")]
    Malformed(String),
}

#[derive(Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    error_code: Option<i64>,
    description: Option<String>,
}

#[derive(Deserialize)]
struct SentMessage {
    message_id: i64,
}

/// Outbound channel operations used by the publish path.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Post a message to the promo channel, returning the channel message id.
    async fn send_post(
        &self,
        text: &str,
        image_url: Option<&str>,
    ) -> Result<i64, TelegramError>;

    /// Delete a message from the promo channel.
    async fn delete_message(&self, message_id: i64) -> Result<(), TelegramError>;

    /// Direct-message a user. Failures are the caller's to ignore.
    async fn notify_user(&self, user_id: i64, text: &str) -> Result<(), TelegramError>;
}

pub struct TelegramClient {
    http: Client,
    api_url: String,
    bot_token: String,
    channel_id: i64,
}

impl TelegramClient {
    pub fn new(config: &TelegramConfig) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            bot_token: config.bot_token.clone(),
            channel_id: config.channel_id,
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_url, self.bot_token, method)
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        body: serde_json::Value,
    ) -> Result<T, TelegramError> {
        let response = self
            .http
            .post(self.method_url(method))
            .json(&body)
            .send()
            .await?;

        let parsed: ApiResponse<T> = response.json().await?;
        if !parsed.ok {
            return Err(TelegramError::Api {
                code: parsed.error_code.unwrap_or(0),
                description: parsed
                    .description
                    .unwrap_or_else(|| "no description".to_string()),
            });
        }
        parsed
            .result
            .ok_or_else(|| TelegramError::Malformed(format!("{} returned ok without result", method)))
    }
}

#[async_trait]
impl Channel for TelegramClient {
    async fn send_post(
        &self,
        text: &str,
        image_url: Option<&str>,
    ) -> Result<i64, TelegramError> {
        let sent: SentMessage = match image_url {
            Some(image) => {
                // Captions are hard-capped; cut on an escape-safe boundary
                // so the API does not reject the markup.
                let caption = truncate_markdown_v2(text, MAX_CAPTION_LEN);
                self.call(
                    "sendPhoto",
                    json!({
                        "chat_id": self.channel_id,
                        "photo": image,
                        "caption": caption,
                        "parse_mode": "MarkdownV2",
                    }),
                )
                .await?
            }
            None => {
                self.call(
                    "sendMessage",
                    json!({
                        "chat_id": self.channel_id,
                        "text": text,
                        "parse_mode": "MarkdownV2",
                        "disable_web_page_preview": false,
                    }),
                )
                .await?
            }
        };
        debug!(message_id = sent.message_id, "Posted message to channel");
        Ok(sent.message_id)
    }

    async fn delete_message(&self, message_id: i64) -> Result<(), TelegramError> {
        let _: bool = self
            .call(
                "deleteMessage",
                json!({
                    "chat_id": self.channel_id,
                    "message_id": message_id,
                }),
            )
            .await?;
        Ok(())
    }

    async fn notify_user(&self, user_id: i64, text: &str) -> Result<(), TelegramError> {
        let result: Result<SentMessage, TelegramError> = self
            .call(
                "sendMessage",
                json!({
                    "chat_id": user_id,
                    "text": text,
                }),
            )
            .await;
        if let Err(ref e) = result {
            warn!(user_id, error = %e, "Failed to notify user");
        }
        result.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_url() {
        let client = TelegramClient {
            http: Client::new(),
            api_url: "https://api.telegram.org".to_string(),
            bot_token: "123:abc".to_string(),
            channel_id: -100,
        };
        assert_eq!(
            client.method_url("sendMessage"),
            "https://api.telegram.org/bot123:abc/sendMessage"
        );
    }
}
