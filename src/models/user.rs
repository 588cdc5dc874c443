use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};

use crate::schema::users;

/// Telegram user; `id` is the Telegram user id.
#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct User {
    pub id: i64,
    pub username: String,
    pub is_premium: bool,
}

impl User {
    pub async fn find_by_id(
        conn: &mut AsyncPgConnection,
        user_id: i64,
    ) -> Result<Option<Self>, diesel::result::Error> {
        use crate::schema::users::dsl;

        dsl::users.find(user_id).first::<Self>(conn).await.optional()
    }

    /// Insert or refresh a user record on first contact.
    pub async fn upsert(
        conn: &mut AsyncPgConnection,
        user: User,
    ) -> Result<Self, diesel::result::Error> {
        use crate::schema::users::dsl;

        diesel::insert_into(dsl::users)
            .values(&user)
            .on_conflict(dsl::id)
            .do_update()
            .set((
                dsl::username.eq(&user.username),
                dsl::is_premium.eq(user.is_premium),
            ))
            .get_result::<Self>(conn)
            .await
    }
}
