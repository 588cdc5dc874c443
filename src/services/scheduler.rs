// Scheduled-publish loop. Each iteration publishes whatever is due inside
// the tolerance window, backfills an empty firing slot with a random post,
// and then sleeps an adaptive interval derived from the next scheduled
// publish time.

use chrono::Utc;
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::db::DieselPool;
use crate::models::Post;
use crate::services::publisher::{PublishError, Publisher};
use crate::services::random_post::RandomPostService;
use crate::services::slots::{next_wake, SlotTable};

pub struct Scheduler {
    pool: DieselPool,
    publisher: Arc<Publisher>,
    random_posts: Option<Arc<RandomPostService>>,
    slot_table: SlotTable,
    poll_period: std::time::Duration,
}

impl Scheduler {
    pub fn new(
        pool: DieselPool,
        publisher: Arc<Publisher>,
        random_posts: Option<Arc<RandomPostService>>,
        slot_table: SlotTable,
        poll_period: std::time::Duration,
    ) -> Self {
        Self {
            pool,
            publisher,
            random_posts,
            slot_table,
            poll_period,
        }
    }

    /// Run forever. Iteration errors are logged and absorbed; the loop
    /// itself never exits.
    pub async fn run(&self) {
        info!(period = ?self.poll_period, "Scheduled-publish loop started");
        loop {
            let wake = self.iteration().await;
            sleep(wake).await;
        }
    }

    /// One pass: publish due posts, backfill an empty slot, compute the
    /// next wake. Any failure falls back to the default poll period.
    async fn iteration(&self) -> std::time::Duration {
        let mut conn = match self.pool.get().await {
            Ok(conn) => conn,
            Err(e) => {
                error!(error = %e, "Scheduler could not get a database connection");
                return self.poll_period;
            }
        };

        let now = Utc::now();
        let tolerance = self.slot_table.tolerance();

        let due = match Post::find_due_scheduled(&mut conn, now - tolerance, now + tolerance).await
        {
            Ok(due) => due,
            Err(e) => {
                error!(error = %e, "Failed to load due posts");
                return self.poll_period;
            }
        };

        for post in &due {
            match self.publisher.publish_to_channel(&mut conn, post.id).await {
                Ok(message_id) => debug!(post_id = post.id, message_id, "Published due post"),
                Err(PublishError::AlreadyInProgress(post_id, status)) => {
                    debug!(post_id, ?status, "Due post already handled")
                }
                Err(e) => warn!(post_id = post.id, error = %e, "Due post failed to publish"),
            }
        }

        // A slot fired but nothing was booked in it: fill it with a
        // generated post and publish immediately.
        if due.is_empty() {
            if let (Some(random_posts), Some(slot)) =
                (self.random_posts.as_ref(), self.slot_table.matching_slot(now))
            {
                match random_posts.create_for_slot(&mut conn, slot).await {
                    Ok(post) => {
                        if let Err(e) =
                            self.publisher.publish_to_channel(&mut conn, post.id).await
                        {
                            warn!(post_id = post.id, error = %e, "Backfill post failed to publish");
                        }
                    }
                    Err(e) => warn!(error = %e, "Could not backfill empty slot"),
                }
            }
        }

        match Post::next_scheduled_after(&mut conn, now).await {
            Ok(next) => next_wake(now, next.and_then(|p| p.published_at), self.poll_period),
            Err(e) => {
                warn!(error = %e, "Failed to look up next scheduled post");
                self.poll_period
            }
        }
    }
}
