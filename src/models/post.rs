// Post model: one product announcement moving through the publication
// lifecycle (draft -> accepted -> paid -> scheduled -> publishing ->
// published / canceled / obsolete).

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};

use crate::schema::posts;

#[derive(
    Debug, Clone, PartialEq, Eq, Queryable, Selectable, Identifiable, AsChangeset, Serialize, Deserialize,
)]
#[diesel(table_name = posts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Post {
    pub id: i32,
    pub user_id: Option<i64>,
    pub content: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub link: Option<String>,
    pub short_url: Option<String>,
    pub price: Option<String>,
    pub status: String,
    pub telegram_message_id: Option<i64>,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = posts)]
pub struct NewPost {
    pub user_id: Option<i64>,
    pub content: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub link: Option<String>,
    pub price: Option<String>,
    pub status: String,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Closed set of post lifecycle states. All call sites go through this
/// type; raw status strings never leave the database layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostStatus {
    Draft,
    Accepted,
    Paid,
    Scheduled,
    Publishing,
    Published,
    Canceled,
    Obsolete,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Accepted => "accepted",
            PostStatus::Paid => "paid",
            PostStatus::Scheduled => "scheduled",
            PostStatus::Publishing => "publishing",
            PostStatus::Published => "published",
            PostStatus::Canceled => "canceled",
            PostStatus::Obsolete => "obsolete",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(PostStatus::Draft),
            "accepted" => Some(PostStatus::Accepted),
            "paid" => Some(PostStatus::Paid),
            "scheduled" => Some(PostStatus::Scheduled),
            "publishing" => Some(PostStatus::Publishing),
            "published" => Some(PostStatus::Published),
            "canceled" => Some(PostStatus::Canceled),
            "obsolete" => Some(PostStatus::Obsolete),
            _ => None,
        }
    }

    /// Central transition validity table. `publishing` is reachable only
    /// from `scheduled`, and `published` only from `publishing`.
    pub fn can_transition(&self, next: PostStatus) -> bool {
        use PostStatus::*;
        matches!(
            (self, next),
            (Draft, Accepted)
                | (Draft, Obsolete)
                | (Accepted, Paid)
                | (Accepted, Obsolete)
                | (Paid, Scheduled)
                | (Paid, Canceled)
                | (Paid, Obsolete)
                | (Scheduled, Publishing)
                | (Scheduled, Canceled)
                | (Publishing, Published)
                | (Publishing, Scheduled)
                | (Published, Canceled)
        )
    }
}

/// Outcome of attempting to claim a post for publishing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// Post claimed; carries the row as it was at claim time
    Claimed(Box<Post>),
    NotFound,
    /// Idempotency signal: already `published` or `publishing`
    AlreadyInProgress(PostStatus),
    /// Any other status that publishing is not a valid transition from
    NotPublishable(PostStatus),
}

/// Classify a claim attempt from the post's current status. Pure; the
/// transactional wrapper below applies it under a row lock.
pub fn classify_claim(status: PostStatus) -> Result<(), ClaimOutcome> {
    match status {
        PostStatus::Published | PostStatus::Publishing => {
            Err(ClaimOutcome::AlreadyInProgress(status))
        }
        PostStatus::Scheduled => Ok(()),
        other => Err(ClaimOutcome::NotPublishable(other)),
    }
}

impl Post {
    pub fn status(&self) -> Option<PostStatus> {
        PostStatus::from_str(&self.status)
    }

    pub async fn find_by_id(
        conn: &mut AsyncPgConnection,
        post_id: i32,
    ) -> Result<Option<Self>, diesel::result::Error> {
        use crate::schema::posts::dsl;

        dsl::posts.find(post_id).first::<Self>(conn).await.optional()
    }

    /// Insert a new draft, marking any older non-obsolete draft/accepted/paid
    /// post of the same user obsolete first (one active submission per user).
    pub async fn create_draft(
        conn: &mut AsyncPgConnection,
        new_post: NewPost,
    ) -> Result<Self, diesel::result::Error> {
        use crate::schema::posts::dsl;

        conn.transaction(|conn| {
            async move {
                if let Some(owner) = new_post.user_id {
                    diesel::update(
                        dsl::posts.filter(dsl::user_id.eq(owner)).filter(
                            dsl::status.eq_any(vec![
                                PostStatus::Draft.as_str(),
                                PostStatus::Accepted.as_str(),
                                PostStatus::Paid.as_str(),
                            ]),
                        ),
                    )
                    .set(dsl::status.eq(PostStatus::Obsolete.as_str()))
                    .execute(conn)
                    .await?;
                }

                diesel::insert_into(dsl::posts)
                    .values(&new_post)
                    .get_result::<Self>(conn)
                    .await
            }
            .scope_boxed()
        })
        .await
    }

    /// Posts due for publication: `scheduled` with `published_at` inside
    /// the window, ascending.
    pub async fn find_due_scheduled(
        conn: &mut AsyncPgConnection,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<Self>, diesel::result::Error> {
        use crate::schema::posts::dsl;

        dsl::posts
            .filter(dsl::status.eq(PostStatus::Scheduled.as_str()))
            .filter(dsl::published_at.between(window_start, window_end))
            .order(dsl::published_at.asc())
            .load::<Self>(conn)
            .await
    }

    /// Earliest future scheduled post, used to compute the next wake.
    pub async fn next_scheduled_after(
        conn: &mut AsyncPgConnection,
        now: DateTime<Utc>,
    ) -> Result<Option<Self>, diesel::result::Error> {
        use crate::schema::posts::dsl;

        dsl::posts
            .filter(dsl::status.eq(PostStatus::Scheduled.as_str()))
            .filter(dsl::published_at.gt(now))
            .order(dsl::published_at.asc())
            .first::<Self>(conn)
            .await
            .optional()
    }

    /// All publish timestamps at or after `from`, regardless of status.
    /// Used by slot allocation to test occupancy in memory.
    pub async fn occupied_publish_times(
        conn: &mut AsyncPgConnection,
        from: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, diesel::result::Error> {
        use crate::schema::posts::dsl;

        let times: Vec<Option<DateTime<Utc>>> = dsl::posts
            .filter(dsl::published_at.ge(from))
            .select(dsl::published_at)
            .load(conn)
            .await?;
        Ok(times.into_iter().flatten().collect())
    }

    /// Claim a post for publishing inside a short transaction with a row
    /// lock. Commits status `publishing` and releases the lock before any
    /// network I/O happens; the narrow duplicate-publish window this leaves
    /// across processes is accepted for a single-process deployment.
    pub async fn claim_for_publishing(
        conn: &mut AsyncPgConnection,
        post_id: i32,
    ) -> Result<ClaimOutcome, diesel::result::Error> {
        use crate::schema::posts::dsl;

        conn.transaction(|conn| {
            async move {
                let post = dsl::posts
                    .find(post_id)
                    .for_update()
                    .first::<Self>(conn)
                    .await
                    .optional()?;

                let post = match post {
                    Some(p) => p,
                    None => return Ok(ClaimOutcome::NotFound),
                };

                let status = match post.status() {
                    Some(s) => s,
                    None => return Ok(ClaimOutcome::NotPublishable(PostStatus::Canceled)),
                };

                if let Err(outcome) = classify_claim(status) {
                    return Ok(outcome);
                }

                diesel::update(dsl::posts.find(post_id))
                    .set(dsl::status.eq(PostStatus::Publishing.as_str()))
                    .execute(conn)
                    .await?;

                Ok(ClaimOutcome::Claimed(Box::new(post)))
            }
            .scope_boxed()
        })
        .await
    }

    /// Finalize a successful publish: message id, actual publish instant
    /// (UTC), final short link, status `published`.
    pub async fn mark_published(
        conn: &mut AsyncPgConnection,
        post_id: i32,
        message_id: i64,
        published_at: DateTime<Utc>,
        short_url: Option<&str>,
    ) -> Result<(), diesel::result::Error> {
        use crate::schema::posts::dsl;

        diesel::update(dsl::posts.find(post_id))
            .set((
                dsl::status.eq(PostStatus::Published.as_str()),
                dsl::telegram_message_id.eq(message_id),
                dsl::published_at.eq(published_at),
                dsl::short_url.eq(short_url),
            ))
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Compensating rollback after a transport failure, so the next loop
    /// iteration retries.
    pub async fn rollback_to_scheduled(
        conn: &mut AsyncPgConnection,
        post_id: i32,
    ) -> Result<(), diesel::result::Error> {
        use crate::schema::posts::dsl;

        diesel::update(dsl::posts.find(post_id))
            .set(dsl::status.eq(PostStatus::Scheduled.as_str()))
            .execute(conn)
            .await?;
        Ok(())
    }

    pub async fn cancel(
        conn: &mut AsyncPgConnection,
        post_id: i32,
    ) -> Result<(), diesel::result::Error> {
        use crate::schema::posts::dsl;

        diesel::update(dsl::posts.find(post_id))
            .set(dsl::status.eq(PostStatus::Canceled.as_str()))
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Book a slot: `paid` post gets a future publish timestamp (UTC) and
    /// moves to `scheduled`.
    pub async fn schedule_at(
        conn: &mut AsyncPgConnection,
        post_id: i32,
        publish_at: DateTime<Utc>,
    ) -> Result<(), diesel::result::Error> {
        use crate::schema::posts::dsl;

        diesel::update(dsl::posts.find(post_id))
            .set((
                dsl::status.eq(PostStatus::Scheduled.as_str()),
                dsl::published_at.eq(publish_at),
            ))
            .execute(conn)
            .await?;
        Ok(())
    }

    pub async fn mark_accepted(
        conn: &mut AsyncPgConnection,
        post_id: i32,
    ) -> Result<(), diesel::result::Error> {
        use crate::schema::posts::dsl;

        diesel::update(dsl::posts.find(post_id))
            .set(dsl::status.eq(PostStatus::Accepted.as_str()))
            .execute(conn)
            .await?;
        Ok(())
    }

    pub async fn mark_paid(
        conn: &mut AsyncPgConnection,
        post_id: i32,
    ) -> Result<(), diesel::result::Error> {
        use crate::schema::posts::dsl;

        diesel::update(dsl::posts.find(post_id))
            .set(dsl::status.eq(PostStatus::Paid.as_str()))
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Delete abandoned submissions (`draft`/`accepted` older than the
    /// cutoff). Returns the number of rows removed.
    pub async fn delete_stale_drafts(
        conn: &mut AsyncPgConnection,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, diesel::result::Error> {
        use crate::schema::posts::dsl;

        diesel::delete(
            dsl::posts
                .filter(dsl::status.eq_any(vec![
                    PostStatus::Draft.as_str(),
                    PostStatus::Accepted.as_str(),
                ]))
                .filter(dsl::created_at.lt(cutoff)),
        )
        .execute(conn)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            PostStatus::Draft,
            PostStatus::Accepted,
            PostStatus::Paid,
            PostStatus::Scheduled,
            PostStatus::Publishing,
            PostStatus::Published,
            PostStatus::Canceled,
            PostStatus::Obsolete,
        ] {
            assert_eq!(PostStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(PostStatus::from_str("bogus"), None);
    }

    #[test]
    fn test_publishing_only_from_scheduled() {
        for status in [
            PostStatus::Draft,
            PostStatus::Accepted,
            PostStatus::Paid,
            PostStatus::Published,
            PostStatus::Canceled,
            PostStatus::Obsolete,
        ] {
            assert!(!status.can_transition(PostStatus::Publishing));
        }
        assert!(PostStatus::Scheduled.can_transition(PostStatus::Publishing));
    }

    #[test]
    fn test_published_only_from_publishing() {
        assert!(PostStatus::Publishing.can_transition(PostStatus::Published));
        assert!(!PostStatus::Scheduled.can_transition(PostStatus::Published));
        assert!(!PostStatus::Paid.can_transition(PostStatus::Published));
    }

    #[test]
    fn test_publishing_rollback_allowed() {
        assert!(PostStatus::Publishing.can_transition(PostStatus::Scheduled));
    }

    #[test]
    fn test_classify_claim() {
        assert!(classify_claim(PostStatus::Scheduled).is_ok());
        assert_eq!(
            classify_claim(PostStatus::Published),
            Err(ClaimOutcome::AlreadyInProgress(PostStatus::Published))
        );
        assert_eq!(
            classify_claim(PostStatus::Publishing),
            Err(ClaimOutcome::AlreadyInProgress(PostStatus::Publishing))
        );
        assert_eq!(
            classify_claim(PostStatus::Draft),
            Err(ClaimOutcome::NotPublishable(PostStatus::Draft))
        );
    }
}
