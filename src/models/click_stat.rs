// Per-click records against shortened post links, written by the tracking
// redirect handler. Auxiliary analytics, never part of the publish path.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};

use crate::schema::click_stats;

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = click_stats)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ClickStat {
    pub id: i32,
    pub post_id: i32,
    pub clicked_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = click_stats)]
pub struct NewClickStat {
    pub post_id: i32,
    pub clicked_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl ClickStat {
    pub async fn record(
        conn: &mut AsyncPgConnection,
        new_click: NewClickStat,
    ) -> Result<(), diesel::result::Error> {
        use crate::schema::click_stats::dsl;

        diesel::insert_into(dsl::click_stats)
            .values(&new_click)
            .execute(conn)
            .await?;
        Ok(())
    }

    pub async fn count_for_post(
        conn: &mut AsyncPgConnection,
        post: i32,
    ) -> Result<i64, diesel::result::Error> {
        use crate::schema::click_stats::dsl;

        dsl::click_stats
            .filter(dsl::post_id.eq(post))
            .count()
            .get_result(conn)
            .await
    }
}
