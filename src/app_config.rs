// Centralized configuration management for promopost
// Load ALL env vars ONCE at startup

use chrono::FixedOffset;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Global application configuration loaded once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(|| {
    // For tests, load .env file first
    #[cfg(test)]
    dotenv::dotenv().ok();

    AppConfig::from_env().expect("Failed to load configuration")
});

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    // Server
    pub bind_address: String,
    pub public_base_url: String,
    pub environment: Environment,

    // Database
    pub database_url: String,
    pub database_max_connections: u32,
    pub database_min_connections: u32,
    pub database_connect_timeout: u64,

    // Nested sections
    pub telegram: TelegramConfig,
    pub payment: PaymentProviderConfig,
    pub shortener: ShortenerConfig,
    pub generator: GeneratorConfig,
    pub reactions: ReactionConfig,
    pub scraping: ScrapingConfig,
    pub scheduling: SchedulingConfig,
}

/// Environment type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Environment {
    Development,
    Test,
    Staging,
    Production,
}

impl From<String> for Environment {
    fn from(s: String) -> Self {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Environment::Development,
            "test" => Environment::Test,
            "staging" | "stage" => Environment::Staging,
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        }
    }
}

/// Telegram transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub api_url: String,
    /// Numeric chat id of the target channel
    pub channel_id: i64,
    /// Public @username of the channel, used for post permalinks
    pub channel_username: String,
}

/// Payment provider (YooKassa-style) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentProviderConfig {
    pub shop_id: String,
    pub secret_key: String,
    pub api_url: String,
}

/// Link shortener providers, tried in order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShortenerConfig {
    pub bitly_token: String,
    pub bitly_api_url: String,
    pub cuttly_api_key: String,
    pub cuttly_api_url: String,
}

/// Marketing copy generator (chat-completions API)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    pub api_key: String,
    pub api_url: String,
    pub model: String,
}

/// Reaction sidecar configuration (best-effort decoration client)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionConfig {
    /// Base URL of the automation sidecar; empty disables reactions
    pub sidecar_url: String,
}

/// Marketplace scraping configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapingConfig {
    /// Scraping-proxy API key for the proxy-assisted marketplace
    pub proxy_api_key: String,
    pub proxy_api_url: String,
    /// Comma-separated category listing URLs, per source
    pub wildberries_category_urls: Vec<String>,
    pub ozon_category_urls: Vec<String>,
}

/// Publication slots and loop periods
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulingConfig {
    /// "HH:MM,HH:MM,..." wall-clock slots in the display offset
    pub slots: Vec<(u32, u32)>,
    /// Display timezone as a fixed offset from UTC, in hours
    pub display_utc_offset_hours: i32,
    pub tolerance: Duration,
    pub publish_poll_period: Duration,
    pub refund_poll_period: Duration,
    pub cleanup_period: Duration,
    pub draft_max_age: Duration,
    /// How many free slots to offer a user after payment
    pub offered_slot_count: usize,
}

impl SchedulingConfig {
    pub fn display_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.display_utc_offset_hours * 3600)
            .expect("display offset out of range")
    }
}

fn parse_slots(raw: &str) -> Result<Vec<(u32, u32)>, ConfigError> {
    let mut slots = Vec::new();
    for part in raw.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let (h, m) = part.split_once(':').ok_or_else(|| {
            ConfigError::InvalidValue("PUBLISH_SLOTS".to_string(), format!("bad slot '{part}'"))
        })?;
        let hour: u32 = h.parse().map_err(|_| {
            ConfigError::InvalidValue("PUBLISH_SLOTS".to_string(), format!("bad hour '{h}'"))
        })?;
        let minute: u32 = m.parse().map_err(|_| {
            ConfigError::InvalidValue("PUBLISH_SLOTS".to_string(), format!("bad minute '{m}'"))
        })?;
        if hour > 23 || minute > 59 {
            return Err(ConfigError::InvalidValue(
                "PUBLISH_SLOTS".to_string(),
                format!("slot '{part}' out of range"),
            ));
        }
        slots.push((hour, minute));
    }
    if slots.is_empty() {
        return Err(ConfigError::InvalidValue(
            "PUBLISH_SLOTS".to_string(),
            "at least one slot is required".to_string(),
        ));
    }
    slots.sort_unstable();
    Ok(slots)
}

fn parse_url_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Helper function to get required env var
        let get_required = |key: &str| -> Result<String, ConfigError> {
            env::var(key).map_err(|_| ConfigError::MissingVar(key.to_string()))
        };

        // Helper function to get optional env var with default
        let get_or_default =
            |key: &str, default: &str| -> String { env::var(key).unwrap_or_else(|_| default.to_string()) };

        let parse_or_default = |key: &str, default: &str| -> Result<u32, ConfigError> {
            get_or_default(key, default).parse().map_err(|_| {
                ConfigError::InvalidValue(key.to_string(), "not a valid u32".to_string())
            })
        };

        let parse_u64_or_default = |key: &str, default: &str| -> Result<u64, ConfigError> {
            get_or_default(key, default).parse().map_err(|_| {
                ConfigError::InvalidValue(key.to_string(), "not a valid u64".to_string())
            })
        };

        let bind_address = get_or_default("BIND_ADDRESS", "0.0.0.0:8080");
        let public_base_url =
            get_or_default("PUBLIC_BASE_URL", &format!("http://{}", bind_address));
        let environment = Environment::from(get_or_default("ENVIRONMENT", "development"));

        let database_url = get_required("DATABASE_URL")?;
        let database_max_connections = parse_or_default("DATABASE_MAX_CONNECTIONS", "10")?;
        let database_min_connections = parse_or_default("DATABASE_MIN_CONNECTIONS", "2")?;
        let database_connect_timeout = parse_u64_or_default("DATABASE_CONNECT_TIMEOUT", "30")?;

        let telegram = TelegramConfig {
            bot_token: get_required("TELEGRAM_BOT_TOKEN")?,
            api_url: get_or_default("TELEGRAM_API_URL", "https://api.telegram.org"),
            channel_id: get_required("TELEGRAM_CHANNEL_ID")?.parse().map_err(|_| {
                ConfigError::InvalidValue(
                    "TELEGRAM_CHANNEL_ID".to_string(),
                    "not a valid i64".to_string(),
                )
            })?,
            channel_username: get_or_default("TELEGRAM_CHANNEL_USERNAME", ""),
        };

        let payment = PaymentProviderConfig {
            shop_id: get_or_default("PAYMENT_SHOP_ID", ""),
            secret_key: get_or_default("PAYMENT_SECRET_KEY", ""),
            api_url: get_or_default("PAYMENT_API_URL", "https://api.yookassa.ru/v3/payments"),
        };

        let shortener = ShortenerConfig {
            bitly_token: get_or_default("BITLY_ACCESS_TOKEN", ""),
            bitly_api_url: get_or_default("BITLY_API_URL", "https://api-ssl.bitly.com/v4"),
            cuttly_api_key: get_or_default("CUTTLY_API_KEY", ""),
            cuttly_api_url: get_or_default("CUTTLY_API_URL", "https://cutt.ly/api/api.php"),
        };

        let generator = GeneratorConfig {
            api_key: get_or_default("OPENAI_API_KEY", ""),
            api_url: get_or_default(
                "OPENAI_API_URL",
                "https://api.openai.com/v1/chat/completions",
            ),
            model: get_or_default("OPENAI_MODEL", "gpt-4o-mini"),
        };

        let reactions = ReactionConfig {
            sidecar_url: get_or_default("REACTION_SIDECAR_URL", ""),
        };

        let scraping = ScrapingConfig {
            proxy_api_key: get_or_default("SCRAPING_PROXY_API_KEY", ""),
            proxy_api_url: get_or_default("SCRAPING_PROXY_API_URL", "https://api.zenrows.com/v1/"),
            wildberries_category_urls: parse_url_list(&get_or_default(
                "WILDBERRIES_CATEGORY_URLS",
                "",
            )),
            ozon_category_urls: parse_url_list(&get_or_default("OZON_CATEGORY_URLS", "")),
        };

        let display_utc_offset_hours: i32 = get_or_default("DISPLAY_UTC_OFFSET_HOURS", "3")
            .parse()
            .map_err(|_| {
                ConfigError::InvalidValue(
                    "DISPLAY_UTC_OFFSET_HOURS".to_string(),
                    "not a valid i32".to_string(),
                )
            })?;
        if !(-23..=23).contains(&display_utc_offset_hours) {
            return Err(ConfigError::InvalidValue(
                "DISPLAY_UTC_OFFSET_HOURS".to_string(),
                "offset must be within -23..=23".to_string(),
            ));
        }

        let scheduling = SchedulingConfig {
            slots: parse_slots(&get_or_default(
                "PUBLISH_SLOTS",
                "07:10,09:20,11:54,18:00,23:35",
            ))?,
            display_utc_offset_hours,
            tolerance: Duration::from_secs(parse_u64_or_default("SLOT_TOLERANCE_SECONDS", "10")?),
            publish_poll_period: Duration::from_secs(parse_u64_or_default(
                "PUBLISH_POLL_SECONDS",
                "60",
            )?),
            refund_poll_period: Duration::from_secs(parse_u64_or_default(
                "REFUND_POLL_SECONDS",
                "60",
            )?),
            cleanup_period: Duration::from_secs(parse_u64_or_default("CLEANUP_SECONDS", "1800")?),
            draft_max_age: Duration::from_secs(
                parse_u64_or_default("DRAFT_MAX_AGE_HOURS", "24")? * 3600,
            ),
            offered_slot_count: parse_or_default("OFFERED_SLOT_COUNT", "6")? as usize,
        };

        Ok(Self {
            bind_address,
            public_base_url,
            environment,
            database_url,
            database_max_connections,
            database_min_connections,
            database_connect_timeout,
            telegram,
            payment,
            shortener,
            generator,
            reactions,
            scraping,
            scheduling,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }
}

/// Get the global configuration instance
pub fn config() -> &'static AppConfig {
    &CONFIG
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_from_string() {
        assert_eq!(
            Environment::from("development".to_string()),
            Environment::Development
        );
        assert_eq!(
            Environment::from("prod".to_string()),
            Environment::Production
        );
        assert_eq!(Environment::from("test".to_string()), Environment::Test);
    }

    #[test]
    fn test_parse_slots_sorted_and_validated() {
        let slots = parse_slots("18:00,07:10, 09:20").unwrap();
        assert_eq!(slots, vec![(7, 10), (9, 20), (18, 0)]);

        assert!(parse_slots("25:00").is_err());
        assert!(parse_slots("12:61").is_err());
        assert!(parse_slots("").is_err());
        assert!(parse_slots("banana").is_err());
    }

    #[test]
    fn test_parse_url_list() {
        let urls = parse_url_list("https://a.example/x, https://b.example/y ,");
        assert_eq!(urls.len(), 2);
        assert_eq!(urls[0], "https://a.example/x");
    }

    #[test]
    fn test_display_offset() {
        let cfg = SchedulingConfig {
            slots: vec![(7, 10)],
            display_utc_offset_hours: 3,
            tolerance: Duration::from_secs(10),
            publish_poll_period: Duration::from_secs(60),
            refund_poll_period: Duration::from_secs(60),
            cleanup_period: Duration::from_secs(1800),
            draft_max_age: Duration::from_secs(86400),
            offered_slot_count: 6,
        };
        assert_eq!(cfg.display_offset().local_minus_utc(), 3 * 3600);
    }
}
