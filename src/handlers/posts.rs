// Submission lifecycle API: create a draft, accept it, open a payment,
// and take the gateway's payment webhook. Status changes all go through
// the transition table; a request that would skip a step gets a 409.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::app::AppState;
use crate::models::{NewPayment, NewPost, Payment, PaymentStatus, Post, PostStatus, User};
use crate::utils::normalize_product_url;

#[derive(Deserialize)]
pub struct CreatePostRequest {
    pub user_id: i64,
    pub username: String,
    #[serde(default)]
    pub is_premium: bool,
    pub content: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub link: Option<String>,
    pub price: Option<String>,
}

#[derive(Deserialize)]
pub struct CreatePaymentRequest {
    pub amount_minor: i32,
    pub invoice_message_id: Option<String>,
}

#[derive(Deserialize)]
pub struct PaymentWebhook {
    pub event: String,
    pub object: PaymentWebhookObject,
}

#[derive(Deserialize)]
pub struct PaymentWebhookObject {
    pub id: String,
    pub metadata: Option<PaymentWebhookMetadata>,
}

#[derive(Deserialize)]
pub struct PaymentWebhookMetadata {
    pub payment_id: Option<i32>,
}

/// Create a draft submission. Any older unfinished submission of the same
/// user is marked obsolete inside the same transaction.
pub async fn create_post(
    State(state): State<AppState>,
    Json(request): Json<CreatePostRequest>,
) -> Response {
    if request.content.trim().is_empty() {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": "content must not be empty" })),
        )
            .into_response();
    }

    // The link is later emitted in a Location header by the tracking
    // redirect, so only well-formed http(s) URLs are stored.
    let link = match request.link.as_deref() {
        Some(raw) => match normalize_product_url(raw) {
            Some(link) => Some(link),
            None => {
                return (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    Json(json!({ "error": "link must be an absolute http(s) URL" })),
                )
                    .into_response();
            }
        },
        None => None,
    };

    let mut conn = match state.pool.get().await {
        Ok(conn) => conn,
        Err(e) => {
            warn!(error = %e, "Draft creation could not get a database connection");
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
    };

    let user = User {
        id: request.user_id,
        username: request.username,
        is_premium: request.is_premium,
    };
    if let Err(e) = User::upsert(&mut conn, user).await {
        warn!(user_id = request.user_id, error = %e, "User upsert failed");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    let new_post = NewPost {
        user_id: Some(request.user_id),
        content: request.content,
        description: request.description,
        image_url: request.image_url,
        link,
        price: request.price,
        status: PostStatus::Draft.as_str().to_string(),
        published_at: None,
        created_at: Utc::now(),
    };

    match Post::create_draft(&mut conn, new_post).await {
        Ok(post) => {
            info!(post_id = post.id, user_id = request.user_id, "Draft created");
            (StatusCode::CREATED, Json(post)).into_response()
        }
        Err(e) => {
            warn!(error = %e, "Draft creation failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn get_post(State(state): State<AppState>, Path(post_id): Path<i32>) -> Response {
    let mut conn = match state.pool.get().await {
        Ok(conn) => conn,
        Err(e) => {
            warn!(error = %e, "Post lookup could not get a database connection");
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
    };

    match Post::find_by_id(&mut conn, post_id).await {
        Ok(Some(post)) => (StatusCode::OK, Json(post)).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            warn!(post_id, error = %e, "Post lookup failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Moderation approval: draft -> accepted.
pub async fn accept_post(State(state): State<AppState>, Path(post_id): Path<i32>) -> Response {
    let mut conn = match state.pool.get().await {
        Ok(conn) => conn,
        Err(e) => {
            warn!(error = %e, "Accept could not get a database connection");
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
    };

    match guarded_transition(&mut conn, post_id, PostStatus::Accepted).await {
        Ok(()) => {
            if let Err(e) = Post::mark_accepted(&mut conn, post_id).await {
                warn!(post_id, error = %e, "Accept failed");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
            info!(post_id, "Post accepted");
            StatusCode::OK.into_response()
        }
        Err(response) => response,
    }
}

/// Open a pending payment for an accepted post. The provider payment id
/// arrives later through the webhook.
pub async fn create_payment(
    State(state): State<AppState>,
    Path(post_id): Path<i32>,
    Json(request): Json<CreatePaymentRequest>,
) -> Response {
    if request.amount_minor <= 0 {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": "amount_minor must be positive" })),
        )
            .into_response();
    }

    let mut conn = match state.pool.get().await {
        Ok(conn) => conn,
        Err(e) => {
            warn!(error = %e, "Payment creation could not get a database connection");
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
    };

    let post = match Post::find_by_id(&mut conn, post_id).await {
        Ok(Some(post)) => post,
        Ok(None) => return StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            warn!(post_id, error = %e, "Payment post lookup failed");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    let user_id = match (post.status(), post.user_id) {
        (Some(status), Some(user_id)) if status.can_transition(PostStatus::Paid) => user_id,
        (status, _) => {
            return (
                StatusCode::CONFLICT,
                Json(json!({ "error": format!("post cannot take a payment from {:?}", status) })),
            )
                .into_response();
        }
    };

    let new_payment = NewPayment {
        user_id,
        post_id,
        provider_payment_id: None,
        amount_minor: request.amount_minor,
        status: PaymentStatus::Pending.as_str().to_string(),
        invoice_message_id: request.invoice_message_id,
        created_at: Utc::now(),
    };

    match Payment::create(&mut conn, new_payment).await {
        Ok(payment) => {
            info!(payment_id = payment.id, post_id, "Payment opened");
            (StatusCode::CREATED, Json(payment)).into_response()
        }
        Err(e) => {
            warn!(post_id, error = %e, "Payment creation failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Whether a `payment.succeeded` delivery still needs processing. Only a
/// pending payment does: `Succeeded` means the event is a redelivery, and
/// `Refunded`/`Canceled` mean reconciliation has already moved past this
/// payment and a late redelivery must not resurrect it.
pub fn webhook_needs_processing(local: PaymentStatus) -> bool {
    local == PaymentStatus::Pending
}

/// Gateway notification. `payment.succeeded` attaches the provider id,
/// marks the payment succeeded, and moves the post to `paid`. Repeated
/// deliveries of the same event are no-ops.
pub async fn payment_webhook(
    State(state): State<AppState>,
    Json(webhook): Json<PaymentWebhook>,
) -> Response {
    if webhook.event != "payment.succeeded" {
        return StatusCode::OK.into_response();
    }

    let mut conn = match state.pool.get().await {
        Ok(conn) => conn,
        Err(e) => {
            warn!(error = %e, "Webhook could not get a database connection");
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
    };

    // Prefer the local id from metadata, fall back to a provider id match
    // for redeliveries that already carry one.
    let payment = match webhook
        .object
        .metadata
        .as_ref()
        .and_then(|m| m.payment_id)
    {
        Some(local_id) => match Payment::find_by_id(&mut conn, local_id).await {
            Ok(payment) => payment,
            Err(e) => {
                warn!(payment_id = local_id, error = %e, "Webhook payment lookup failed");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        },
        None => match Payment::find_latest_by_provider_id(&mut conn, &webhook.object.id).await {
            Ok(payment) => payment,
            Err(e) => {
                warn!(provider_id = %webhook.object.id, error = %e, "Webhook provider lookup failed");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        },
    };
    let payment = match payment {
        Some(payment) => payment,
        None => return StatusCode::NOT_FOUND.into_response(),
    };

    match payment.status() {
        Some(local) if webhook_needs_processing(local) => {}
        _ => return StatusCode::OK.into_response(),
    }

    let result = async {
        Payment::attach_provider_id(&mut conn, payment.id, &webhook.object.id).await?;
        Payment::set_status(&mut conn, payment.id, PaymentStatus::Succeeded).await?;
        Post::find_by_id(&mut conn, payment.post_id).await
    }
    .await;

    let post = match result {
        Ok(post) => post,
        Err(e) => {
            warn!(payment_id = payment.id, error = %e, "Webhook processing failed");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    // The post may have moved on (canceled, obsoleted) while the payment
    // was in flight; `paid` is only written where the transition table
    // allows it.
    match post.and_then(|p| p.status()) {
        Some(status) if status.can_transition(PostStatus::Paid) => {
            if let Err(e) = Post::mark_paid(&mut conn, payment.post_id).await {
                warn!(payment_id = payment.id, error = %e, "Webhook processing failed");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
            info!(
                payment_id = payment.id,
                post_id = payment.post_id,
                "Payment succeeded, post marked paid"
            );
        }
        status => {
            warn!(
                payment_id = payment.id,
                post_id = payment.post_id,
                ?status,
                "Payment recorded but post not movable to paid"
            );
        }
    }
    StatusCode::OK.into_response()
}

async fn guarded_transition(
    conn: &mut diesel_async::AsyncPgConnection,
    post_id: i32,
    next: PostStatus,
) -> Result<(), Response> {
    let post = match Post::find_by_id(conn, post_id).await {
        Ok(Some(post)) => post,
        Ok(None) => return Err(StatusCode::NOT_FOUND.into_response()),
        Err(e) => {
            warn!(post_id, error = %e, "Transition lookup failed");
            return Err(StatusCode::INTERNAL_SERVER_ERROR.into_response());
        }
    };
    match post.status() {
        Some(status) if status.can_transition(next) => Ok(()),
        status => Err((
            StatusCode::CONFLICT,
            Json(json!({ "error": format!("invalid transition from {:?} to {:?}", status, next) })),
        )
            .into_response()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_pending_payments_are_processed() {
        assert!(webhook_needs_processing(PaymentStatus::Pending));
        assert!(!webhook_needs_processing(PaymentStatus::Succeeded));
    }

    #[test]
    fn test_late_redelivery_cannot_resurrect_a_refund() {
        // Once the reconciliation loop has marked the payment refunded (or
        // canceled), a redelivered success event must be a no-op.
        assert!(!webhook_needs_processing(PaymentStatus::Refunded));
        assert!(!webhook_needs_processing(PaymentStatus::Canceled));
        // And the post side is gated too: a canceled post never goes paid.
        assert!(!PostStatus::Canceled.can_transition(PostStatus::Paid));
        assert!(!PostStatus::Obsolete.can_transition(PostStatus::Paid));
    }
}
