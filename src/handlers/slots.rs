// Slot offering and booking. Offers are a read-only snapshot with no
// reservation; booking re-checks freshness so a stale offer is rejected
// instead of double-booking a slot.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::app::AppState;
use crate::models::{Payment, Post, PostStatus};
use crate::services::slots::find_nearest_slots;

#[derive(Serialize)]
pub struct SlotOffer {
    pub slots: Vec<DateTime<Utc>>,
}

#[derive(Deserialize)]
pub struct ScheduleRequest {
    pub publish_at: DateTime<Utc>,
}

/// The next free publication slots.
pub async fn offer_slots(State(state): State<AppState>) -> Response {
    let mut conn = match state.pool.get().await {
        Ok(conn) => conn,
        Err(e) => {
            warn!(error = %e, "Slot offer could not get a database connection");
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
    };

    match find_nearest_slots(
        &mut conn,
        &state.slot_table,
        Utc::now(),
        state.offered_slot_count,
    )
    .await
    {
        Ok(slots) => (StatusCode::OK, Json(SlotOffer { slots })).into_response(),
        Err(e) => {
            warn!(error = %e, "Slot offer query failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Book a paid post into a chosen slot. The slot must still be free and in
/// the future; offers carry no reservation.
pub async fn schedule_post(
    State(state): State<AppState>,
    Path(post_id): Path<i32>,
    Json(request): Json<ScheduleRequest>,
) -> Response {
    let mut conn = match state.pool.get().await {
        Ok(conn) => conn,
        Err(e) => {
            warn!(error = %e, "Scheduling could not get a database connection");
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
    };

    let post = match Post::find_by_id(&mut conn, post_id).await {
        Ok(Some(post)) => post,
        Ok(None) => return StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            warn!(post_id, error = %e, "Scheduling lookup failed");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    match post.status() {
        Some(status) if status.can_transition(PostStatus::Scheduled) => {}
        status => {
            return (
                StatusCode::CONFLICT,
                Json(json!({ "error": format!("post cannot be scheduled from {:?}", status) })),
            )
                .into_response();
        }
    }

    // Paid means exactly: a succeeded payment row exists.
    match Payment::find_succeeded_for_post(&mut conn, post_id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            return (
                StatusCode::CONFLICT,
                Json(json!({ "error": "post has no succeeded payment" })),
            )
                .into_response();
        }
        Err(e) => {
            warn!(post_id, error = %e, "Payment check failed");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    let now = Utc::now();
    if request.publish_at <= now {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": "publish_at must be in the future" })),
        )
            .into_response();
    }

    // Freshness re-check: the chosen instant must still be among the free
    // slots.
    let free = match find_nearest_slots(&mut conn, &state.slot_table, now, 64).await {
        Ok(free) => free,
        Err(e) => {
            warn!(error = %e, "Slot freshness check failed");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    if !free.contains(&request.publish_at) {
        return (
            StatusCode::CONFLICT,
            Json(json!({ "error": "slot is no longer available" })),
        )
            .into_response();
    }

    if let Err(e) = Post::schedule_at(&mut conn, post_id, request.publish_at).await {
        warn!(post_id, error = %e, "Failed to schedule post");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    info!(post_id, publish_at = %request.publish_at, "Post scheduled");
    (
        StatusCode::OK,
        Json(json!({ "post_id": post_id, "publish_at": request.publish_at })),
    )
        .into_response()
}
