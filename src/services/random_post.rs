// Auto-generated filler posts. When the channel would otherwise sit idle,
// a product is scraped from a marketplace, described, and dropped into the
// nearest free publication slot as an already-scheduled post. The regular
// scheduler picks it up from there.

use chrono::{DateTime, Utc};
use diesel_async::AsyncPgConnection;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::models::{NewPost, Post, PostStatus};
use crate::services::description::DescriptionGenerator;
use crate::services::products::{ProductScraper, ScrapeError};
use crate::services::slots::{find_nearest_slots, SlotTable};

#[derive(Error, Debug)]
pub enum RandomPostError {
    #[error("Product sourcing failed: {0}")]
    Scrape(#[from] ScrapeError),
    #[error("No free publication slot available")]
    NoFreeSlot,
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),
}

pub struct RandomPostService {
    scraper: Arc<ProductScraper>,
    generator: Arc<dyn DescriptionGenerator>,
    slot_table: SlotTable,
}

impl RandomPostService {
    pub fn new(
        scraper: Arc<ProductScraper>,
        generator: Arc<dyn DescriptionGenerator>,
        slot_table: SlotTable,
    ) -> Self {
        Self {
            scraper,
            generator,
            slot_table,
        }
    }

    /// Source a product and schedule it into the nearest free slot.
    /// Returns the created post.
    pub async fn create_scheduled_post(
        &self,
        conn: &mut AsyncPgConnection,
    ) -> Result<Post, RandomPostError> {
        let now = Utc::now();
        let slot = find_nearest_slots(conn, &self.slot_table, now, 1)
            .await?
            .into_iter()
            .next()
            .ok_or(RandomPostError::NoFreeSlot)?;
        self.create_for_slot(conn, slot).await
    }

    /// Source a product and schedule it at an explicit slot instant. Used
    /// by the scheduler when a slot fires with nothing booked in it.
    pub async fn create_for_slot(
        &self,
        conn: &mut AsyncPgConnection,
        slot: DateTime<Utc>,
    ) -> Result<Post, RandomPostError> {
        let product = self.scraper.random_product().await?;
        let description = self.generator.describe(&product.title).await;

        let post = Post::create_draft(
            conn,
            NewPost {
                user_id: None,
                content: product.title.clone(),
                description: Some(description),
                image_url: Some(product.image_url),
                link: Some(product.link),
                price: Some(product.price),
                status: PostStatus::Scheduled.as_str().to_string(),
                published_at: Some(slot),
                created_at: Utc::now(),
            },
        )
        .await?;

        info!(post_id = post.id, publish_at = %slot, "Random post scheduled");
        Ok(post)
    }
}
