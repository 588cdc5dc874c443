// Channel message assembly: MarkdownV2 safety, link decoration, and the
// caption length cap.

use chrono::Utc;
use promopost::models::Post;
use promopost::services::publisher::build_channel_content;
use promopost::services::telegram::MAX_CAPTION_LEN;
use promopost::utils::{add_tracking_param, tracking_redirect_url, truncate_markdown_v2};

fn post(content: &str) -> Post {
    Post {
        id: 7,
        user_id: Some(42),
        content: content.to_string(),
        description: Some("Ships fast. Solid build.".to_string()),
        image_url: Some("https://img.example/p.jpg".to_string()),
        link: Some("https://shop.example/item?id=9".to_string()),
        short_url: None,
        price: Some("1.990 rub.".to_string()),
        status: "scheduled".to_string(),
        telegram_message_id: None,
        published_at: None,
        created_at: Utc::now(),
    }
}

#[test]
fn reserved_characters_are_escaped_outside_links() {
    let text = build_channel_content(
        &post("Deal of the day (50% off)!"),
        Some("https://bit.ly/promo1"),
    );
    assert!(text.contains("Deal of the day \\(50% off\\)\\!"));
    assert!(text.contains("Price: 1\\.990 rub\\."));
    // The appended link stays functional
    assert!(text.contains("[Buy here](https://bit.ly/promo1)"));
}

#[test]
fn raw_product_url_is_replaced_by_tracked_link() {
    let text = build_channel_content(
        &post("Check this https://shop.example/item?id=9 today"),
        Some("https://bit.ly/promo1"),
    );
    assert!(!text.contains("shop.example"));
    assert!(text.contains("bit.ly/promo1"));
}

#[test]
fn tracked_destination_carries_post_attribution() {
    let redirect = tracking_redirect_url("https://promo.example", 7);
    assert_eq!(redirect, "https://promo.example/r/7");

    let destination = add_tracking_param("https://shop.example/item?id=9", 7);
    assert_eq!(destination, "https://shop.example/item?id=9&post_id=7");
}

#[test]
fn caption_cap_matches_channel_limit() {
    // The transport truncates captions to this limit; the cut must land
    // on a boundary the channel will still parse.
    assert_eq!(MAX_CAPTION_LEN, 1024);

    let long = format!("Deal! {}", "a.".repeat(1500));
    let text = build_channel_content(&post(&long), Some("https://bit.ly/promo1"));
    let truncated = truncate_markdown_v2(&text, MAX_CAPTION_LEN);
    assert!(truncated.chars().count() <= MAX_CAPTION_LEN);
    assert!(!truncated.ends_with('\\'));
}
