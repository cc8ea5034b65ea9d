//! HTTP routes for the loyalty gateway

pub mod auth_routes;
pub mod health;
pub mod qr_routes;
pub mod rewards_routes;

pub use auth_routes::handle_auth_request;
pub use health::{health_check, readiness_check, version_info};
pub use qr_routes::{handle_qr_issue, handle_qr_verify};
pub use rewards_routes::{
    handle_achievement_seen, handle_award_points, handle_stamp_progress, handle_unseen_achievements,
};

use bytes::Bytes;
use http_body_util::{BodyExt, Empty, Full};
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::auth::{extract_token_from_header, SessionClaims};
use crate::server::AppState;
use crate::types::{Result, StampgateError};

pub type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

/// Max accepted request body
const MAX_BODY_BYTES: usize = 64 * 1024;

pub(crate) fn full_body(data: impl Into<Bytes>) -> BoxBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed()
}

pub(crate) fn empty_body() -> BoxBody {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed()
}

pub(crate) fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<BoxBody> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, OPTIONS")
        .header("Access-Control-Allow-Headers", "Content-Type, Authorization")
        .body(full_body(json))
        .unwrap()
}

#[derive(Serialize)]
pub(crate) struct ErrorBody {
    pub error: String,
    pub code: &'static str,
}

/// Map a service error onto its HTTP status and stable error code
pub(crate) fn error_response(err: &StampgateError) -> Response<BoxBody> {
    json_response(
        err.status_code(),
        &ErrorBody {
            error: err.to_string(),
            code: err.code(),
        },
    )
}

pub(crate) fn cors_preflight() -> Response<BoxBody> {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, OPTIONS")
        .header("Access-Control-Allow-Headers", "Content-Type, Authorization")
        .header("Access-Control-Max-Age", "86400")
        .body(empty_body())
        .unwrap()
}

/// Collect and deserialize a JSON request body
pub(crate) async fn parse_json_body<T: DeserializeOwned>(req: Request<Incoming>) -> Result<T> {
    let body = req
        .collect()
        .await
        .map_err(|e| StampgateError::Http(format!("failed to read body: {e}")))?
        .to_bytes();
    if body.len() > MAX_BODY_BYTES {
        return Err(StampgateError::InvalidArgument("request body too large".to_string()));
    }
    serde_json::from_slice(&body)
        .map_err(|e| StampgateError::InvalidArgument(format!("invalid JSON body: {e}")))
}

pub(crate) fn get_auth_header(req: &Request<Incoming>) -> Option<&str> {
    req.headers()
        .get("authorization")
        .and_then(|h| h.to_str().ok())
}

/// Authenticate the request's session token
pub(crate) fn authenticate(req: &Request<Incoming>, state: &AppState) -> Result<SessionClaims> {
    let token = extract_token_from_header(get_auth_header(req))
        .ok_or_else(|| StampgateError::Unauthenticated("no token provided".to_string()))?;

    let result = state.session_jwt.verify_token(token);
    if !result.valid {
        return Err(StampgateError::Unauthenticated(
            result.error.unwrap_or_else(|| "invalid token".to_string()),
        ));
    }
    result
        .claims
        .ok_or_else(|| StampgateError::Unauthenticated("invalid token".to_string()))
}
