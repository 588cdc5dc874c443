// Product description generation via a chat-completions API, behind a
// trait so the random-post path can be tested without a network. Every
// failure degrades to a deterministic template; a missing description
// never blocks a publish.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::warn;

use crate::app_config::GeneratorConfig;

#[async_trait]
pub trait DescriptionGenerator: Send + Sync {
    /// Short selling description for a product title. Infallible by
    /// contract: implementations fall back to a template.
    async fn describe(&self, title: &str) -> String;
}

/// Template used whenever generation is unavailable.
pub fn fallback_description(title: &str) -> String {
    format!("{}. Great quality at a fair price.", title.trim())
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

pub struct ChatCompletionsGenerator {
    http: Client,
    config: GeneratorConfig,
}

impl ChatCompletionsGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self { http, config }
    }

    async fn request_description(&self, title: &str) -> Result<String, anyhow::Error> {
        let body = json!({
            "model": self.config.model,
            "messages": [
                {
                    "role": "system",
                    "content": "You write short, punchy product descriptions for a deals channel. Two sentences max, no hashtags, no emoji."
                },
                { "role": "user", "content": title }
            ],
            "max_tokens": 180,
            "temperature": 0.7,
        });

        let response = self
            .http
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let completion: ChatCompletion = response.json().await?;
        let text = completion
            .choices
            .first()
            .map(|c| c.message.content.trim().to_string())
            .unwrap_or_default();
        if text.is_empty() {
            anyhow::bail!("empty completion");
        }
        Ok(text)
    }
}

#[async_trait]
impl DescriptionGenerator for ChatCompletionsGenerator {
    async fn describe(&self, title: &str) -> String {
        if self.config.api_key.is_empty() {
            return fallback_description(title);
        }
        match self.request_description(title).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Description generation failed, using fallback");
                fallback_description(title)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_description() {
        assert_eq!(
            fallback_description("  Wireless Mouse "),
            "Wireless Mouse. Great quality at a fair price."
        );
    }
}
