// Payment model: one payment attempt tied to a post. The external payment
// id arrives asynchronously after the pre-checkout step.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};

use crate::schema::payments;

#[derive(
    Debug, Clone, Queryable, Selectable, Identifiable, AsChangeset, Serialize, Deserialize,
)]
#[diesel(table_name = payments)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Payment {
    pub id: i32,
    pub user_id: i64,
    pub post_id: i32,
    pub provider_payment_id: Option<String>,
    /// Amount in minor currency units (e.g. kopecks)
    pub amount_minor: i32,
    pub status: String,
    pub invoice_message_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = payments)]
pub struct NewPayment {
    pub user_id: i64,
    pub post_id: i32,
    pub provider_payment_id: Option<String>,
    pub amount_minor: i32,
    pub status: String,
    pub invoice_message_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Canceled,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Succeeded => "succeeded",
            PaymentStatus::Canceled => "canceled",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PaymentStatus::Pending),
            "succeeded" => Some(PaymentStatus::Succeeded),
            "canceled" => Some(PaymentStatus::Canceled),
            "refunded" => Some(PaymentStatus::Refunded),
            _ => None,
        }
    }
}

impl Payment {
    pub fn status(&self) -> Option<PaymentStatus> {
        PaymentStatus::from_str(&self.status)
    }

    pub async fn create(
        conn: &mut AsyncPgConnection,
        new_payment: NewPayment,
    ) -> Result<Self, diesel::result::Error> {
        use crate::schema::payments::dsl;

        diesel::insert_into(dsl::payments)
            .values(&new_payment)
            .get_result::<Self>(conn)
            .await
    }

    pub async fn find_by_id(
        conn: &mut AsyncPgConnection,
        payment_id: i32,
    ) -> Result<Option<Self>, diesel::result::Error> {
        use crate::schema::payments::dsl;

        dsl::payments
            .find(payment_id)
            .first::<Self>(conn)
            .await
            .optional()
    }

    /// Payments the refund loop must keep an eye on: `succeeded` (may get
    /// refunded) and `refunded` (re-checked so a second sighting stays a
    /// no-op).
    pub async fn find_reconcilable(
        conn: &mut AsyncPgConnection,
    ) -> Result<Vec<Self>, diesel::result::Error> {
        use crate::schema::payments::dsl;

        dsl::payments
            .filter(dsl::status.eq_any(vec![
                PaymentStatus::Succeeded.as_str(),
                PaymentStatus::Refunded.as_str(),
            ]))
            .order(dsl::created_at.asc())
            .load::<Self>(conn)
            .await
    }

    /// Latest payment row carrying the given provider id.
    pub async fn find_latest_by_provider_id(
        conn: &mut AsyncPgConnection,
        provider_id: &str,
    ) -> Result<Option<Self>, diesel::result::Error> {
        use crate::schema::payments::dsl;

        dsl::payments
            .filter(dsl::provider_payment_id.eq(provider_id))
            .order(dsl::created_at.desc())
            .first::<Self>(conn)
            .await
            .optional()
    }

    /// The single `succeeded` payment for a post, if any. A post is
    /// considered paid exactly when this returns a row.
    pub async fn find_succeeded_for_post(
        conn: &mut AsyncPgConnection,
        post_id: i32,
    ) -> Result<Option<Self>, diesel::result::Error> {
        use crate::schema::payments::dsl;

        dsl::payments
            .filter(dsl::post_id.eq(post_id))
            .filter(dsl::status.eq(PaymentStatus::Succeeded.as_str()))
            .order(dsl::created_at.desc())
            .first::<Self>(conn)
            .await
            .optional()
    }

    /// Attach the provider-assigned payment id once the pre-confirmation
    /// callback arrives.
    pub async fn attach_provider_id(
        conn: &mut AsyncPgConnection,
        payment_id: i32,
        provider_id: &str,
    ) -> Result<(), diesel::result::Error> {
        use crate::schema::payments::dsl;

        diesel::update(dsl::payments.find(payment_id))
            .set(dsl::provider_payment_id.eq(provider_id))
            .execute(conn)
            .await?;
        Ok(())
    }

    pub async fn set_status(
        conn: &mut AsyncPgConnection,
        payment_id: i32,
        status: PaymentStatus,
    ) -> Result<(), diesel::result::Error> {
        use crate::schema::payments::dsl;

        diesel::update(dsl::payments.find(payment_id))
            .set(dsl::status.eq(status.as_str()))
            .execute(conn)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            PaymentStatus::Pending,
            PaymentStatus::Succeeded,
            PaymentStatus::Canceled,
            PaymentStatus::Refunded,
        ] {
            assert_eq!(PaymentStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(PaymentStatus::from_str("partially_refunded"), None);
    }
}
