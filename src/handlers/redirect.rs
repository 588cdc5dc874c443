// Click-tracking redirect plus the small operational surface (health,
// metrics, per-post click stats). The redirect is the hot path: record the
// click off the request path and forward the visitor immediately.

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde_json::json;
use tracing::{debug, warn};

use crate::app::AppState;
use crate::db::check_diesel_health;
use crate::metrics;
use crate::models::{ClickStat, NewClickStat, Post};
use crate::utils::{add_tracking_param, normalize_product_url};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/r/{post_id}", get(tracking_redirect))
        .route("/api/v1/posts", post(super::posts::create_post))
        .route("/api/v1/posts/{post_id}", get(super::posts::get_post))
        .route(
            "/api/v1/posts/{post_id}/accept",
            post(super::posts::accept_post),
        )
        .route(
            "/api/v1/posts/{post_id}/payments",
            post(super::posts::create_payment),
        )
        .route(
            "/api/v1/payments/webhook",
            post(super::posts::payment_webhook),
        )
        .route("/api/v1/slots", get(super::slots::offer_slots))
        .route(
            "/api/v1/posts/{post_id}/schedule",
            post(super::slots::schedule_post),
        )
        .route("/api/v1/posts/{post_id}/stats", get(post_stats))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Response {
    match check_diesel_health(&state.pool).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ok" }))).into_response(),
        Err(e) => {
            warn!(error = %e, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unhealthy" })),
            )
                .into_response()
        }
    }
}

async fn metrics_endpoint() -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render(),
    )
        .into_response()
}

/// Forward a click to the product page, recording it on the way through.
/// The insert happens on a spawned task; the visitor never waits for it.
async fn tracking_redirect(
    State(state): State<AppState>,
    Path(post_id): Path<i32>,
    headers: HeaderMap,
) -> Response {
    let mut conn = match state.pool.get().await {
        Ok(conn) => conn,
        Err(e) => {
            warn!(error = %e, "Redirect could not get a database connection");
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
    };

    let post = match Post::find_by_id(&mut conn, post_id).await {
        Ok(Some(post)) => post,
        Ok(None) => return StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            warn!(post_id, error = %e, "Redirect lookup failed");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    // Stored links are validated at draft creation, but rows may predate
    // that; never panic on a malformed one.
    let link = match post.link.as_deref().and_then(normalize_product_url) {
        Some(link) => link,
        None if post.link.is_some() => {
            warn!(post_id, "Stored product link is not a valid URL");
            return StatusCode::BAD_GATEWAY.into_response();
        }
        None => return StatusCode::NOT_FOUND.into_response(),
    };
    drop(conn);

    let click = NewClickStat {
        post_id,
        clicked_at: Utc::now(),
        ip_address: header_value(&headers, "x-forwarded-for"),
        user_agent: header_value(&headers, "user-agent"),
    };
    let pool = state.pool.clone();
    tokio::spawn(async move {
        let mut conn = match pool.get().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(error = %e, "Click record skipped, no connection");
                return;
            }
        };
        match ClickStat::record(&mut conn, click).await {
            Ok(()) => metrics::CLICKS_RECORDED.inc(),
            Err(e) => warn!(post_id, error = %e, "Failed to record click"),
        }
    });

    let destination = add_tracking_param(&link, post_id);
    debug!(post_id, "Forwarding tracked click");
    Redirect::temporary(&destination).into_response()
}

async fn post_stats(State(state): State<AppState>, Path(post_id): Path<i32>) -> Response {
    let mut conn = match state.pool.get().await {
        Ok(conn) => conn,
        Err(e) => {
            warn!(error = %e, "Stats lookup could not get a database connection");
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
    };

    let post = match Post::find_by_id(&mut conn, post_id).await {
        Ok(Some(post)) => post,
        Ok(None) => return StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            warn!(post_id, error = %e, "Stats lookup failed");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    match state.stats.for_post(&mut conn, &post).await {
        Ok(stats) => (StatusCode::OK, Json(stats)).into_response(),
        Err(e) => {
            warn!(post_id, error = %e, "Click count query failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}
