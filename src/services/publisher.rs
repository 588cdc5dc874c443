// Channel publisher: claims a scheduled post, builds the channel message,
// sends it, and finalizes or rolls back. Content assembly is pure so the
// formatting rules are testable without a transport.

use chrono::Utc;
use diesel_async::AsyncPgConnection;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::metrics;
use crate::models::{ClaimOutcome, Post, PostStatus};
use crate::services::reactions::ReactionService;
use crate::services::shortener::ShortenerService;
use crate::services::telegram::{Channel, TelegramError};
use crate::utils::{escape_markdown_v2_except_links, remove_url, tracking_redirect_url};

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Post {0} not found")]
    NotFound(i32),
    #[error("Post {0} is already {1:?}")]
    AlreadyInProgress(i32, PostStatus),
    #[error("Post {0} is not publishable from {1:?}")]
    NotPublishable(i32, PostStatus),
    #[error("Channel transport failed: {0}")]
    Transport(#[from] TelegramError),
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),
}

/// Assemble the MarkdownV2 message body for a post. The raw product URL is
/// stripped from the text and re-appended as a named link pointing at
/// `buy_url` (the shortened tracking link).
pub fn build_channel_content(post: &Post, buy_url: Option<&str>) -> String {
    let mut body = post.content.clone();
    if let Some(link) = post.link.as_deref() {
        body = remove_url(&body, link);
    }
    let mut body = body.trim().to_string();

    if let Some(description) = post.description.as_deref() {
        if !description.trim().is_empty() {
            body.push_str("\n\n");
            body.push_str(description.trim());
        }
    }
    if let Some(price) = post.price.as_deref() {
        if !price.trim().is_empty() {
            body.push_str(&format!("\n\nPrice: {}", price.trim()));
        }
    }
    if let Some(url) = buy_url {
        body.push_str(&format!("\n\n[Buy here]({})", url));
    }

    escape_markdown_v2_except_links(&body)
}

pub struct Publisher {
    channel: Arc<dyn Channel>,
    shortener: Arc<ShortenerService>,
    reactions: Arc<ReactionService>,
    public_base_url: String,
}

impl Publisher {
    pub fn new(
        channel: Arc<dyn Channel>,
        shortener: Arc<ShortenerService>,
        reactions: Arc<ReactionService>,
        public_base_url: String,
    ) -> Self {
        Self {
            channel,
            shortener,
            reactions,
            public_base_url,
        }
    }

    /// Publish one post to the channel. Idempotent against concurrent
    /// invocations: the claim transaction admits exactly one caller, every
    /// other gets `AlreadyInProgress`. A transport failure rolls the post
    /// back to `scheduled` so the scheduler retries it.
    pub async fn publish_to_channel(
        &self,
        conn: &mut AsyncPgConnection,
        post_id: i32,
    ) -> Result<i64, PublishError> {
        let timer = metrics::PUBLISH_LATENCY.start_timer();

        let post = match Post::claim_for_publishing(conn, post_id).await? {
            ClaimOutcome::Claimed(post) => *post,
            ClaimOutcome::NotFound => return Err(PublishError::NotFound(post_id)),
            ClaimOutcome::AlreadyInProgress(status) => {
                info!(post_id, ?status, "Skipping publish, already in progress");
                return Err(PublishError::AlreadyInProgress(post_id, status));
            }
            ClaimOutcome::NotPublishable(status) => {
                warn!(post_id, ?status, "Post is not publishable");
                return Err(PublishError::NotPublishable(post_id, status));
            }
        };

        // Decorate the product link: route it through the local
        // click-tracking redirect, then shorten. All outside the claim
        // transaction. The redirect handler adds the attribution param
        // when it forwards the click.
        let buy_url = match post.link.as_deref() {
            Some(_) => {
                let redirect = tracking_redirect_url(&self.public_base_url, post.id);
                Some(self.shortener.shorten(&redirect).await)
            }
            None => None,
        };

        let text = build_channel_content(&post, buy_url.as_deref());
        match self.channel.send_post(&text, post.image_url.as_deref()).await {
            Ok(message_id) => {
                Post::mark_published(conn, post.id, message_id, Utc::now(), buy_url.as_deref())
                    .await?;
                metrics::POSTS_PUBLISHED.inc();
                timer.observe_duration();
                info!(post_id = post.id, message_id, "Post published");

                // Fire and forget: reaction decoration and owner notice
                // must not delay or fail the publish.
                let reactions = Arc::clone(&self.reactions);
                tokio::spawn(async move {
                    reactions.decorate(message_id).await;
                });
                if let Some(user_id) = post.user_id {
                    let channel = Arc::clone(&self.channel);
                    tokio::spawn(async move {
                        let _ = channel
                            .notify_user(user_id, "Your promo post is now live in the channel.")
                            .await;
                    });
                }

                Ok(message_id)
            }
            Err(e) => {
                error!(post_id = post.id, error = %e, "Publish failed, rolling back to scheduled");
                metrics::POSTS_FAILED.inc();
                Post::rollback_to_scheduled(conn, post.id).await?;
                Err(PublishError::Transport(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn post() -> Post {
        Post {
            id: 5,
            user_id: Some(10),
            content: "Hot deal! https://shop.example/item".to_string(),
            description: Some("Compact and sturdy.".to_string()),
            image_url: None,
            link: Some("https://shop.example/item".to_string()),
            short_url: None,
            price: Some("499 rub.".to_string()),
            status: "scheduled".to_string(),
            telegram_message_id: None,
            published_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_content_strips_raw_url_and_appends_link() {
        let text = build_channel_content(&post(), Some("https://bit.ly/x1"));
        assert!(!text.contains("shop.example/item"));
        assert!(text.contains("[Buy here](https://bit.ly/x1)"));
        assert!(text.starts_with("Hot deal\\!"));
    }

    #[test]
    fn test_content_includes_description_and_price() {
        let text = build_channel_content(&post(), None);
        assert!(text.contains("Compact and sturdy\\."));
        assert!(text.contains("Price: 499 rub\\."));
        assert!(!text.contains("[Buy here]"));
    }

    #[test]
    fn test_content_skips_empty_optionals() {
        let mut p = post();
        p.description = Some("   ".to_string());
        p.price = None;
        let text = build_channel_content(&p, None);
        assert!(!text.contains("Price:"));
        assert!(!text.ends_with('\n'));
    }
}
