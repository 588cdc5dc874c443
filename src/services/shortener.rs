// Link shortening with provider fallback. Bitly is tried first, Cuttly
// second, and when both fail the original URL is used unshortened. Which
// provider produced a short link is recoverable from its host, so click
// counts route to the right API later.

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

use crate::app_config::ShortenerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortenerProvider {
    Bitly,
    Cuttly,
}

/// Identify the provider behind a stored short URL.
pub fn provider_of(short_url: &str) -> Option<ShortenerProvider> {
    if short_url.contains("bit.ly") {
        Some(ShortenerProvider::Bitly)
    } else if short_url.contains("cutt.ly") {
        Some(ShortenerProvider::Cuttly)
    } else {
        None
    }
}

#[derive(Deserialize)]
struct BitlyShorten {
    link: String,
}

#[derive(Deserialize)]
struct BitlyClicks {
    total_clicks: i64,
}

#[derive(Deserialize)]
struct CuttlyUrl {
    status: i64,
    #[serde(rename = "shortLink")]
    short_link: Option<String>,
}

#[derive(Deserialize)]
struct CuttlyShorten {
    url: CuttlyUrl,
}

#[derive(Deserialize)]
struct CuttlyStatsInner {
    clicks: Option<i64>,
}

#[derive(Deserialize)]
struct CuttlyStats {
    stats: Option<CuttlyStatsInner>,
}

pub struct ShortenerService {
    http: Client,
    config: ShortenerConfig,
}

impl ShortenerService {
    pub fn new(config: ShortenerConfig) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();
        Self { http, config }
    }

    /// Shorten a URL, falling back across providers. Never fails: the
    /// original URL is the last resort.
    pub async fn shorten(&self, long_url: &str) -> String {
        if !self.config.bitly_token.is_empty() {
            match self.shorten_bitly(long_url).await {
                Ok(short) => return short,
                Err(e) => warn!(error = %e, "Bitly shorten failed, trying Cuttly"),
            }
        }
        if !self.config.cuttly_api_key.is_empty() {
            match self.shorten_cuttly(long_url).await {
                Ok(short) => return short,
                Err(e) => warn!(error = %e, "Cuttly shorten failed, using original URL"),
            }
        }
        long_url.to_string()
    }

    async fn shorten_bitly(&self, long_url: &str) -> Result<String, anyhow::Error> {
        let response = self
            .http
            .post(format!("{}/shorten", self.config.bitly_api_url))
            .bearer_auth(&self.config.bitly_token)
            .json(&json!({ "long_url": long_url }))
            .send()
            .await?
            .error_for_status()?;
        let parsed: BitlyShorten = response.json().await?;
        debug!(short = %parsed.link, "Shortened via Bitly");
        Ok(parsed.link)
    }

    async fn shorten_cuttly(&self, long_url: &str) -> Result<String, anyhow::Error> {
        let response = self
            .http
            .get(&self.config.cuttly_api_url)
            .query(&[
                ("key", self.config.cuttly_api_key.as_str()),
                ("short", long_url),
            ])
            .send()
            .await?
            .error_for_status()?;
        let parsed: CuttlyShorten = response.json().await?;
        if parsed.url.status != 7 {
            anyhow::bail!("Cuttly returned status {}", parsed.url.status);
        }
        parsed
            .url
            .short_link
            .ok_or_else(|| anyhow::anyhow!("Cuttly response missing shortLink"))
    }

    /// Provider-side click count for a stored short URL. Returns None for
    /// unshortened links or when the provider call fails.
    pub async fn click_count(&self, short_url: &str) -> Option<i64> {
        match provider_of(short_url)? {
            ShortenerProvider::Bitly => self.bitly_clicks(short_url).await,
            ShortenerProvider::Cuttly => self.cuttly_clicks(short_url).await,
        }
    }

    async fn bitly_clicks(&self, short_url: &str) -> Option<i64> {
        let bitlink = short_url
            .trim_start_matches("https://")
            .trim_start_matches("http://");
        let response = self
            .http
            .get(format!(
                "{}/bitlinks/{}/clicks/summary",
                self.config.bitly_api_url, bitlink
            ))
            .bearer_auth(&self.config.bitly_token)
            .send()
            .await
            .ok()?
            .error_for_status()
            .ok()?;
        let parsed: BitlyClicks = response.json().await.ok()?;
        Some(parsed.total_clicks)
    }

    async fn cuttly_clicks(&self, short_url: &str) -> Option<i64> {
        let response = self
            .http
            .get(&self.config.cuttly_api_url)
            .query(&[
                ("key", self.config.cuttly_api_key.as_str()),
                ("stats", short_url),
            ])
            .send()
            .await
            .ok()?
            .error_for_status()
            .ok()?;
        let parsed: CuttlyStats = response.json().await.ok()?;
        parsed.stats.and_then(|s| s.clicks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_of() {
        assert_eq!(
            provider_of("https://bit.ly/3xyz"),
            Some(ShortenerProvider::Bitly)
        );
        assert_eq!(
            provider_of("https://cutt.ly/abc"),
            Some(ShortenerProvider::Cuttly)
        );
        assert_eq!(provider_of("https://shop.example/item"), None);
    }
}
