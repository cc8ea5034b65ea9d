//! HTTP routes for QR check-in tokens
//!
//! - POST /qr/issue  - App user gets a short-lived single-use token
//! - POST /qr/verify - Store operator scans it; consumes the nonce,
//!   records the check-in, and runs the achievement ledger inline
//!
//! The verify path is the main write path of the service: nonce
//! consumption is the only strict single-use gate, everything after it
//! is idempotent on the nonce as transaction id, so a retried request
//! after a mid-flight crash converges instead of double-counting.

use bson::DateTime;
use chrono::{Datelike, Utc};
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::db::schemas::{AchievementSummary, CheckInDoc, ValueEventDoc, ValueEventType};
use crate::qr::NonceContext;
use crate::routes::{authenticate, error_response, json_response, parse_json_body, BoxBody};
use crate::server::AppState;
use crate::types::{Result, StampgateError};

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct IssueRequest {
    #[serde(default)]
    device_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyRequest {
    token: String,
    #[serde(default)]
    store_id: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VerifyResponse {
    uid: String,
    status: &'static str,
    jti: String,
    summary: AchievementSummary,
}

/// POST /qr/issue
pub async fn handle_qr_issue(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    match issue(req, state).await {
        Ok(resp) => resp,
        Err(e) => error_response(&e),
    }
}

async fn issue(req: Request<Incoming>, state: Arc<AppState>) -> Result<Response<BoxBody>> {
    let claims = authenticate(&req, &state)?;
    let body: IssueRequest = parse_json_body(req).await.unwrap_or_default();

    let issued = issue_for_subject(&state, &claims.sub, body.device_id).await?;
    Ok(json_response(StatusCode::OK, &issued))
}

/// Issue a QR token for an authenticated subject.
///
/// The expiry is always the configured TTL; callers never control the
/// token lifetime. The subject goes into a signed credential, so an
/// unknown account (deleted underneath a live session) is refused.
async fn issue_for_subject(
    state: &AppState,
    subject: &str,
    device_id: Option<String>,
) -> Result<crate::qr::IssuedToken> {
    if state.store.find_user(subject).await?.is_none() {
        return Err(StampgateError::NotFound(format!(
            "no account for token subject {}",
            subject
        )));
    }

    state.tokens.issue(subject, device_id, None)
}

/// POST /qr/verify
pub async fn handle_qr_verify(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    match verify(req, state).await {
        Ok(resp) => resp,
        Err(e) => error_response(&e),
    }
}

async fn verify(req: Request<Incoming>, state: Arc<AppState>) -> Result<Response<BoxBody>> {
    let claims = authenticate(&req, &state)?;

    let operator = state.store.find_user(&claims.sub).await?;
    let can_operate = operator.as_ref().map(|u| u.role.can_operate_store()).unwrap_or(false);
    if !can_operate {
        if state.args.dev_mode {
            warn!(identifier = %claims.sub, "dev mode: store role check relaxed");
        } else {
            return Err(StampgateError::PermissionDenied(
                "store or company role required".to_string(),
            ));
        }
    }

    let body: VerifyRequest = parse_json_body(req).await?;
    if body.token.trim().is_empty() {
        return Err(StampgateError::InvalidArgument("token is required".to_string()));
    }
    // The operator's own store binding wins over the request body
    let store_id = operator
        .as_ref()
        .and_then(|u| u.store_id.clone())
        .or(body.store_id)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| StampgateError::InvalidArgument("storeId is required".to_string()))?;

    let payload = state.tokens.verify(&body.token)?;

    // Strict single-use gate: exactly one scan of a token gets past
    // this line, concurrent duplicates included
    state
        .store
        .consume_nonce(
            &payload.jti,
            NonceContext {
                store_id: store_id.clone(),
                subject: payload.sub.clone(),
                device_id: payload.device_id.clone(),
            },
        )
        .await?;

    let now_utc = Utc::now();
    let now = DateTime::from_chrono(now_utc);
    state
        .store
        .record_check_in(CheckInDoc {
            user_id: payload.sub.clone(),
            store_id: store_id.clone(),
            jti: payload.jti.clone(),
            device_id: payload.device_id.clone(),
            timestamp: now,
        })
        .await?;

    let local = now_utc.with_timezone(&state.args.tz_offset());
    if let Err(e) = state
        .store
        .merge_daily_stats(&local.format("%Y-%m-%d").to_string(), &payload.sub)
        .await
    {
        warn!(user_id = %payload.sub, "failed to merge daily stats: {}", e);
    }

    // The nonce doubles as the transaction id, so a crash-and-retry of
    // this handler cannot create a second value event for one scan
    let event = ValueEventDoc {
        transaction_id: payload.jti.clone(),
        user_id: payload.sub.clone(),
        store_id: store_id.clone(),
        store_name: store_id.clone(),
        event_type: ValueEventType::StampPunch,
        points: state.args.check_in_points,
        weekday: local.weekday().num_days_from_sunday() as i32,
        processed: false,
        summary: None,
        created_at: now,
    };
    state.store.create_value_event(event.clone()).await?;

    let summary = state.ledger.process(&event).await?;
    state.notifier.notify_achievement(&payload.sub, &summary).await;

    info!(
        user_id = %payload.sub,
        store_id = %store_id,
        jti = %payload.jti,
        "check-in accepted",
    );

    Ok(json_response(
        StatusCode::OK,
        &VerifyResponse {
            uid: payload.sub,
            status: "OK",
            jti: payload.jti,
            summary,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::JwtValidator;
    use crate::badges::BadgeEvaluator;
    use crate::config::Args;
    use crate::db::schemas::{UserDoc, UserRole};
    use crate::ledger::AchievementLedger;
    use crate::notify::LogNotifier;
    use crate::otp::{LogMailer, OtpService};
    use crate::qr::TokenService;
    use crate::store::{LoyaltyStore, MemoryStore};
    use clap::Parser;
    use std::time::Instant;

    fn test_state() -> AppState {
        let args = Args::parse_from(["stampgate", "--dev-mode"]);
        let store: Arc<dyn LoyaltyStore> = MemoryStore::shared();
        let evaluator = BadgeEvaluator::new(Arc::clone(&store), args.tz_offset());
        let ledger = Arc::new(AchievementLedger::new(Arc::clone(&store), evaluator));
        let otp = OtpService::new(Arc::clone(&store), Arc::new(LogMailer));
        let tokens = TokenService::new("dev-only-insecure-secret", args.qr_token_ttl_seconds);
        AppState {
            args,
            store,
            tokens,
            session_jwt: JwtValidator::new_dev(),
            ledger,
            otp,
            notifier: Arc::new(LogNotifier),
            mongo_connected: false,
            started_at: Instant::now(),
        }
    }

    async fn seed_user(state: &AppState, identifier: &str) {
        let user = UserDoc::new(identifier.to_string(), "hash".to_string(), UserRole::User);
        assert!(state.store.create_user(user).await.unwrap());
    }

    #[tokio::test]
    async fn test_issue_refused_for_unknown_subject() {
        let state = test_state();
        let err = issue_for_subject(&state, "ghost@example.com", None)
            .await
            .unwrap_err();
        assert!(matches!(err, StampgateError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_issue_expiry_is_always_the_configured_ttl() {
        let state = test_state();
        seed_user(&state, "alice@example.com").await;

        let issued = issue_for_subject(&state, "alice@example.com", Some("dev-1".to_string()))
            .await
            .unwrap();
        let claims = state.tokens.verify(&issued.token).unwrap();

        assert_eq!(
            claims.exp - claims.iat,
            state.args.qr_token_ttl_seconds as i64
        );
        assert_eq!(claims.device_id.as_deref(), Some("dev-1"));
    }

    #[test]
    fn test_issue_request_has_no_expiry_knob() {
        // An expiry supplied by the client is dropped, not honored
        let body: IssueRequest =
            serde_json::from_str(r#"{"deviceId":"dev-1","expiresAt":99999999999}"#).unwrap();
        assert_eq!(body.device_id.as_deref(), Some("dev-1"));
    }
}
