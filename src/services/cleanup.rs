// Stale-draft sweep. Submissions abandoned before payment (`draft` and
// `accepted`) are deleted once they age past the cutoff so the posts table
// does not accumulate dead rows.

use chrono::{Duration, Utc};
use tokio::time::sleep;
use tracing::{error, info};

use crate::db::DieselPool;
use crate::models::Post;

pub struct CleanupSweeper {
    pool: DieselPool,
    period: std::time::Duration,
    max_age: std::time::Duration,
}

impl CleanupSweeper {
    pub fn new(pool: DieselPool, period: std::time::Duration, max_age: std::time::Duration) -> Self {
        Self {
            pool,
            period,
            max_age,
        }
    }

    pub async fn run(&self) {
        info!(period = ?self.period, max_age = ?self.max_age, "Cleanup sweep loop started");
        loop {
            self.sweep().await;
            sleep(self.period).await;
        }
    }

    async fn sweep(&self) {
        let mut conn = match self.pool.get().await {
            Ok(conn) => conn,
            Err(e) => {
                error!(error = %e, "Cleanup sweep could not get a database connection");
                return;
            }
        };

        let max_age =
            Duration::from_std(self.max_age).unwrap_or_else(|_| Duration::hours(24));
        let cutoff = Utc::now() - max_age;

        match Post::delete_stale_drafts(&mut conn, cutoff).await {
            Ok(0) => {}
            Ok(removed) => info!(removed, "Deleted stale draft posts"),
            Err(e) => error!(error = %e, "Stale draft cleanup failed"),
        }
    }
}
