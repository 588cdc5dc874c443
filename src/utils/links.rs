// Link helpers for the publish path: per-post attribution parameters, the
// service-local tracking redirect, and stripping the raw product URL from
// scraped text before the decorated link is appended.

use url::Url;

/// Append a `post_id` query parameter to the product URL so marketplace
/// traffic can be attributed to the post.
pub fn add_tracking_param(raw_url: &str, post_id: i32) -> String {
    match Url::parse(raw_url) {
        Ok(mut url) => {
            let existing: Vec<(String, String)> = url
                .query_pairs()
                .filter(|(k, _)| k != "post_id")
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            {
                let mut pairs = url.query_pairs_mut();
                pairs.clear();
                for (k, v) in &existing {
                    pairs.append_pair(k, v);
                }
                pairs.append_pair("post_id", &post_id.to_string());
            }
            url.to_string()
        }
        Err(_) => raw_url.to_string(),
    }
}

/// The service's own click-tracking redirect for a post.
pub fn tracking_redirect_url(public_base_url: &str, post_id: i32) -> String {
    format!("{}/r/{}", public_base_url.trim_end_matches('/'), post_id)
}

/// Parse and normalize a product URL. Only absolute http(s) URLs are
/// accepted; the normalized form is ASCII-encoded and safe to emit in a
/// Location header.
pub fn normalize_product_url(raw: &str) -> Option<String> {
    let url = Url::parse(raw.trim()).ok()?;
    match url.scheme() {
        "http" | "https" => Some(url.to_string()),
        _ => None,
    }
}

/// Public permalink of a channel message.
pub fn channel_permalink(channel_username: &str, message_id: i64) -> String {
    format!(
        "https://t.me/{}/{}",
        channel_username.trim_start_matches('@'),
        message_id
    )
}

/// Remove every occurrence of the raw URL from scraped text (it gets
/// re-appended as a decorated link).
pub fn remove_url(text: &str, url: &str) -> String {
    if url.is_empty() {
        return text.to_string();
    }
    text.replace(url, "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_tracking_param() {
        let url = add_tracking_param("https://shop.example/item?color=red", 42);
        assert_eq!(url, "https://shop.example/item?color=red&post_id=42");
    }

    #[test]
    fn test_add_tracking_param_replaces_existing() {
        let url = add_tracking_param("https://shop.example/item?post_id=1", 42);
        assert_eq!(url, "https://shop.example/item?post_id=42");
    }

    #[test]
    fn test_add_tracking_param_invalid_url_passthrough() {
        assert_eq!(add_tracking_param("not a url", 7), "not a url");
    }

    #[test]
    fn test_tracking_redirect_url() {
        assert_eq!(
            tracking_redirect_url("https://posts.example/", 9),
            "https://posts.example/r/9"
        );
        assert_eq!(
            tracking_redirect_url("https://posts.example", 9),
            "https://posts.example/r/9"
        );
    }

    #[test]
    fn test_normalize_product_url() {
        assert_eq!(
            normalize_product_url(" https://shop.example/item?id=9 "),
            Some("https://shop.example/item?id=9".to_string())
        );
        // Unsafe header bytes get percent-encoded
        let normalized = normalize_product_url("https://shop.example/a b\u{2192}c").unwrap();
        assert!(normalized.is_ascii());
        assert!(!normalized.contains(' '));
        // Garbage and non-web schemes are rejected
        assert_eq!(normalize_product_url("not a url"), None);
        assert_eq!(normalize_product_url("javascript:alert(1)"), None);
        assert_eq!(normalize_product_url("ftp://files.example/x"), None);
    }

    #[test]
    fn test_channel_permalink() {
        assert_eq!(
            channel_permalink("@promo_channel", 120),
            "https://t.me/promo_channel/120"
        );
        assert_eq!(
            channel_permalink("promo_channel", 120),
            "https://t.me/promo_channel/120"
        );
    }

    #[test]
    fn test_remove_url() {
        let text = "Great deal https://shop.example/item buy now";
        assert_eq!(
            remove_url(text, "https://shop.example/item"),
            "Great deal  buy now"
        );
        assert_eq!(remove_url(text, ""), text);
    }
}
