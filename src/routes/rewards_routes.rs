//! HTTP routes for points, achievements, and stamp progress
//!
//! - POST /points/award                    - Operator credits points
//! - GET  /achievements/unseen             - Unseen achievement feed
//! - POST /achievements/{txnId}/seen       - Acknowledge one entry
//! - GET  /stamps/{storeId}                - Caller's card at a store

use bson::DateTime;
use chrono::{Datelike, Utc};
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::db::schemas::{AchievementSummary, ValueEventDoc, ValueEventType};
use crate::ledger::MAX_STAMPS;
use crate::routes::{authenticate, error_response, json_response, BoxBody};
use crate::server::AppState;
use crate::types::{Result, StampgateError};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AwardPointsRequest {
    user_id: String,
    points: i64,
    #[serde(default)]
    store_id: Option<String>,
    /// Caller-supplied idempotency key; generated when absent
    #[serde(default)]
    transaction_id: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AwardPointsResponse {
    transaction_id: String,
    summary: AchievementSummary,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AchievementEntry {
    transaction_id: String,
    event_type: &'static str,
    store_id: String,
    store_name: String,
    summary: AchievementSummary,
    created_at: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StampProgressResponse {
    store_id: String,
    stamps: i32,
    max_stamps: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_visited_at: Option<String>,
}

/// POST /points/award
pub async fn handle_award_points(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    match award_points(req, state).await {
        Ok(resp) => resp,
        Err(e) => error_response(&e),
    }
}

async fn award_points(req: Request<Incoming>, state: Arc<AppState>) -> Result<Response<BoxBody>> {
    let claims = authenticate(&req, &state)?;

    let operator = state.store.find_user(&claims.sub).await?;
    let can_operate = operator.as_ref().map(|u| u.role.can_operate_store()).unwrap_or(false);
    if !can_operate && !state.args.dev_mode {
        return Err(StampgateError::PermissionDenied(
            "store or company role required".to_string(),
        ));
    }

    let body: AwardPointsRequest = crate::routes::parse_json_body(req).await?;
    if body.points <= 0 {
        return Err(StampgateError::InvalidArgument("points must be positive".to_string()));
    }
    if state.store.find_user(&body.user_id).await?.is_none() {
        return Err(StampgateError::NotFound(format!("no account for {}", body.user_id)));
    }
    let store_id = operator
        .as_ref()
        .and_then(|u| u.store_id.clone())
        .or(body.store_id)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| StampgateError::InvalidArgument("storeId is required".to_string()))?;

    let transaction_id = body
        .transaction_id
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let now_utc = Utc::now();
    let event = ValueEventDoc {
        transaction_id: transaction_id.clone(),
        user_id: body.user_id.clone(),
        store_id: store_id.clone(),
        store_name: store_id,
        event_type: ValueEventType::PointAward,
        points: body.points,
        weekday: now_utc
            .with_timezone(&state.args.tz_offset())
            .weekday()
            .num_days_from_sunday() as i32,
        processed: false,
        summary: None,
        created_at: DateTime::from_chrono(now_utc),
    };

    // A duplicate transaction id is an ordinary redelivery; processing
    // just returns the stored summary for it
    let created = state.store.create_value_event(event.clone()).await?;
    if !created {
        info!(transaction_id = %transaction_id, "point award redelivered");
    }

    let summary = state.ledger.process(&event).await?;
    state.notifier.notify_achievement(&body.user_id, &summary).await;

    Ok(json_response(
        StatusCode::OK,
        &AwardPointsResponse {
            transaction_id,
            summary,
        },
    ))
}

/// GET /achievements/unseen
pub async fn handle_unseen_achievements(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let claims = match authenticate(&req, &state) {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };

    match state.store.unseen_achievement_events(&claims.sub).await {
        Ok(events) => {
            let entries: Vec<AchievementEntry> = events
                .into_iter()
                .map(|e| AchievementEntry {
                    transaction_id: e.transaction_id,
                    event_type: e.event_type.as_str(),
                    store_id: e.store_id,
                    store_name: e.store_name,
                    summary: e.summary,
                    created_at: e.created_at.try_to_rfc3339_string().unwrap_or_default(),
                })
                .collect();
            json_response(StatusCode::OK, &serde_json::json!({ "achievements": entries }))
        }
        Err(e) => error_response(&e),
    }
}

/// POST /achievements/{transactionId}/seen
pub async fn handle_achievement_seen(
    req: Request<Incoming>,
    state: Arc<AppState>,
    transaction_id: &str,
) -> Response<BoxBody> {
    let claims = match authenticate(&req, &state) {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };

    match state.store.mark_achievement_seen(&claims.sub, transaction_id).await {
        // updated=false covers both "already seen" and "no such
        // record"; acknowledgment is idempotent either way
        Ok(updated) => json_response(StatusCode::OK, &serde_json::json!({ "updated": updated })),
        Err(e) => error_response(&e),
    }
}

/// GET /stamps/{storeId}
pub async fn handle_stamp_progress(
    req: Request<Incoming>,
    state: Arc<AppState>,
    store_id: &str,
) -> Response<BoxBody> {
    let claims = match authenticate(&req, &state) {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };

    match state.store.stamp_progress(&claims.sub, store_id).await {
        Ok(card) => {
            let response = match card {
                Some(card) => StampProgressResponse {
                    store_id: card.store_id,
                    stamps: card.stamps,
                    max_stamps: MAX_STAMPS,
                    last_visited_at: card.last_visited_at.try_to_rfc3339_string().ok(),
                },
                None => StampProgressResponse {
                    store_id: store_id.to_string(),
                    stamps: 0,
                    max_stamps: MAX_STAMPS,
                    last_visited_at: None,
                },
            };
            json_response(StatusCode::OK, &response)
        }
        Err(e) => error_response(&e),
    }
}
