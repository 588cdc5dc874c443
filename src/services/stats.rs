// Click statistics for a published post: the locally recorded redirect
// hits plus whatever the shortening provider counted on its side.

use diesel_async::AsyncPgConnection;
use serde::Serialize;
use std::sync::Arc;

use crate::models::{ClickStat, Post};
use crate::services::shortener::ShortenerService;
use crate::utils::channel_permalink;

#[derive(Debug, Serialize)]
pub struct PostClickStats {
    pub post_id: i32,
    pub local_clicks: i64,
    pub provider_clicks: Option<i64>,
    pub permalink: Option<String>,
}

pub struct StatsService {
    shortener: Arc<ShortenerService>,
    channel_username: String,
}

impl StatsService {
    pub fn new(shortener: Arc<ShortenerService>, channel_username: String) -> Self {
        Self {
            shortener,
            channel_username,
        }
    }

    /// Combined click stats for a post. Provider-side counts are optional;
    /// unshortened links and provider outages just leave them out.
    pub async fn for_post(
        &self,
        conn: &mut AsyncPgConnection,
        post: &Post,
    ) -> Result<PostClickStats, diesel::result::Error> {
        let local_clicks = ClickStat::count_for_post(conn, post.id).await?;
        let provider_clicks = match post.short_url.as_deref() {
            Some(short_url) => self.shortener.click_count(short_url).await,
            None => None,
        };
        Ok(PostClickStats {
            post_id: post.id,
            local_clicks,
            provider_clicks,
            permalink: post
                .telegram_message_id
                .map(|id| channel_permalink(&self.channel_username, id)),
        })
    }
}
