// Marketplace product sourcing for auto-generated posts. Wildberries is
// the primary source (public catalog JSON); Ozon is the backup, scraped
// from category HTML through a rendering proxy. Both hand back the same
// ScrapedProduct shape so the random-post path does not care which one
// answered.

use rand::seq::SliceRandom;
use rand::Rng;
use reqwest::Client;
use scraper::{Html, Selector};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::app_config::ScrapingConfig;

#[derive(Error, Debug)]
pub enum ScrapeError {
    #[error("Scrape request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("No usable products found at {0}")]
    Empty(String),
    #[error("No category URLs configured for {0}")]
    NotConfigured(&'static str),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScrapedProduct {
    pub title: String,
    pub price: String,
    pub image_url: String,
    pub link: String,
}

/// Reject products that would make a broken post: missing fields, or
/// placeholder images that are not real product shots.
pub fn is_valid_product(product: &ScrapedProduct) -> bool {
    if product.title.trim().is_empty()
        || product.price.trim().is_empty()
        || product.link.trim().is_empty()
    {
        return false;
    }
    let image = product.image_url.trim();
    if image.is_empty() || !image.starts_with("http") {
        return false;
    }
    let lowered = image.to_lowercase();
    !(lowered.contains("placeholder") || lowered.contains("no-photo") || lowered.ends_with(".svg"))
}

/// Wildberries serves several preview sizes under the same path; swap any
/// `c<N>x<N>` size segment for the large one.
pub fn upgrade_image_quality(image_url: &str) -> String {
    lazy_static::lazy_static! {
        static ref SIZE_RE: regex::Regex =
            regex::Regex::new(r"/c\d+x\d+/").expect("valid size regex");
    }
    SIZE_RE.replace(image_url, "/big/").to_string()
}

#[derive(Deserialize)]
struct WbCatalog {
    data: WbCatalogData,
}

#[derive(Deserialize)]
struct WbCatalogData {
    products: Vec<WbProduct>,
}

#[derive(Deserialize)]
struct WbProduct {
    id: i64,
    name: String,
    #[serde(rename = "salePriceU")]
    sale_price_u: Option<i64>,
    #[serde(rename = "priceU")]
    price_u: Option<i64>,
}

pub struct ProductScraper {
    http: Client,
    config: ScrapingConfig,
}

impl ProductScraper {
    pub fn new(config: ScrapingConfig) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36")
            .build()
            .unwrap_or_default();
        Self { http, config }
    }

    /// A random valid product. The starting marketplace is picked at
    /// random; the other one is the fallback when it yields nothing.
    pub async fn random_product(&self) -> Result<ScrapedProduct, ScrapeError> {
        let wildberries_first = rand::thread_rng().gen_bool(0.5);
        let first = if wildberries_first {
            self.random_wildberries().await
        } else {
            self.random_ozon().await
        };
        match first {
            Ok(product) => Ok(product),
            Err(e) => {
                warn!(error = %e, wildberries_first, "Primary source failed, trying the other");
                if wildberries_first {
                    self.random_ozon().await
                } else {
                    self.random_wildberries().await
                }
            }
        }
    }

    async fn random_wildberries(&self) -> Result<ScrapedProduct, ScrapeError> {
        let url = self
            .config
            .wildberries_category_urls
            .choose(&mut rand::thread_rng())
            .ok_or(ScrapeError::NotConfigured("wildberries"))?;

        let catalog: WbCatalog = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let mut candidates: Vec<ScrapedProduct> = catalog
            .data
            .products
            .into_iter()
            .filter_map(|p| {
                let price_u = p.sale_price_u.or(p.price_u)?;
                Some(ScrapedProduct {
                    title: p.name,
                    price: format!("{} rub.", price_u / 100),
                    image_url: upgrade_image_quality(&wb_image_url(p.id)),
                    link: format!("https://www.wildberries.ru/catalog/{}/detail.aspx", p.id),
                })
            })
            .filter(is_valid_product)
            .collect();

        debug!(count = candidates.len(), url = %url, "Wildberries candidates");
        candidates.shuffle(&mut rand::thread_rng());
        candidates
            .into_iter()
            .next()
            .ok_or_else(|| ScrapeError::Empty(url.clone()))
    }

    async fn random_ozon(&self) -> Result<ScrapedProduct, ScrapeError> {
        let url = self
            .config
            .ozon_category_urls
            .choose(&mut rand::thread_rng())
            .ok_or(ScrapeError::NotConfigured("ozon"))?;

        // Ozon blocks plain HTTP clients; fetch the rendered page through
        // the proxy service.
        let html = self
            .http
            .get(&self.config.proxy_api_url)
            .query(&[
                ("api_key", self.config.proxy_api_key.as_str()),
                ("url", url.as_str()),
                ("render_js", "true"),
            ])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let mut candidates = parse_ozon_tiles(&html);
        debug!(count = candidates.len(), url = %url, "Ozon candidates");
        candidates.shuffle(&mut rand::thread_rng());
        candidates
            .into_iter()
            .next()
            .ok_or_else(|| ScrapeError::Empty(url.clone()))
    }
}

fn wb_image_url(product_id: i64) -> String {
    let vol = product_id / 100_000;
    let part = product_id / 1_000;
    format!(
        "https://basket-01.wbbasket.ru/vol{}/part{}/{}/images/c246x328/1.webp",
        vol, part, product_id
    )
}

/// Extract product tiles from an Ozon category page. Selectors target the
/// search results grid; anything that fails validation is dropped.
fn parse_ozon_tiles(html: &str) -> Vec<ScrapedProduct> {
    let document = Html::parse_document(html);
    let selectors = (
        Selector::parse("div.tile-root"),
        Selector::parse("a[href]"),
        Selector::parse("img[src]"),
        Selector::parse("span.tsBody500Medium"),
        Selector::parse("span.tsHeadline500Medium"),
    );
    let (Ok(tile_sel), Ok(link_sel), Ok(img_sel), Ok(title_sel), Ok(price_sel)) = selectors
    else {
        return Vec::new();
    };

    document
        .select(&tile_sel)
        .filter_map(|tile| {
            let href = tile
                .select(&link_sel)
                .next()
                .and_then(|a| a.value().attr("href"))?;
            let link = if href.starts_with("http") {
                href.to_string()
            } else {
                format!("https://www.ozon.ru{}", href)
            };
            Some(ScrapedProduct {
                title: tile
                    .select(&title_sel)
                    .next()
                    .map(|t| t.text().collect::<String>().trim().to_string())?,
                price: tile
                    .select(&price_sel)
                    .next()
                    .map(|t| t.text().collect::<String>().trim().to_string())?,
                image_url: tile
                    .select(&img_sel)
                    .next()
                    .and_then(|i| i.value().attr("src"))
                    .unwrap_or_default()
                    .to_string(),
                link,
            })
        })
        .filter(is_valid_product)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product() -> ScrapedProduct {
        ScrapedProduct {
            title: "Wireless Mouse".to_string(),
            price: "499 rub.".to_string(),
            image_url: "https://img.example/p/1.webp".to_string(),
            link: "https://shop.example/item/1".to_string(),
        }
    }

    #[test]
    fn test_valid_product_passes() {
        assert!(is_valid_product(&product()));
    }

    #[test]
    fn test_missing_fields_rejected() {
        let mut p = product();
        p.title = "  ".to_string();
        assert!(!is_valid_product(&p));

        let mut p = product();
        p.price = String::new();
        assert!(!is_valid_product(&p));
    }

    #[test]
    fn test_placeholder_images_rejected() {
        let mut p = product();
        p.image_url = "https://img.example/no-photo.png".to_string();
        assert!(!is_valid_product(&p));

        let mut p = product();
        p.image_url = "https://img.example/placeholder.jpg".to_string();
        assert!(!is_valid_product(&p));

        let mut p = product();
        p.image_url = "/relative/path.jpg".to_string();
        assert!(!is_valid_product(&p));
    }

    #[test]
    fn test_upgrade_image_quality() {
        assert_eq!(
            upgrade_image_quality("https://img.example/vol1/c246x328/1.webp"),
            "https://img.example/vol1/big/1.webp"
        );
        assert_eq!(
            upgrade_image_quality("https://img.example/vol1/big/1.webp"),
            "https://img.example/vol1/big/1.webp"
        );
    }

    #[test]
    fn test_parse_ozon_tiles() {
        let html = r#"
            <div class="tile-root">
              <a href="/product/mouse-1/"></a>
              <img src="https://img.example/mouse.jpg"/>
              <span class="tsBody500Medium">Mouse</span>
              <span class="tsHeadline500Medium">499 rub.</span>
            </div>
            <div class="tile-root">
              <a href="/product/broken/"></a>
              <img src="https://img.example/placeholder.jpg"/>
              <span class="tsBody500Medium">Broken</span>
              <span class="tsHeadline500Medium">1 rub.</span>
            </div>
        "#;
        let tiles = parse_ozon_tiles(html);
        assert_eq!(tiles.len(), 1);
        assert_eq!(tiles[0].title, "Mouse");
        assert_eq!(tiles[0].link, "https://www.ozon.ru/product/mouse-1/");
    }
}
