//! HTTP routes for account authentication
//!
//! - POST /auth/register   - Create an account, send a verification code
//! - POST /auth/login      - Authenticate and get a session JWT
//! - POST /auth/verify-otp - Redeem the emailed verification code
//! - GET  /auth/me         - Current account info from the session token

use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::{hash_password, verify_password};
use crate::db::schemas::{UserDoc, UserRole};
use crate::routes::{
    authenticate, cors_preflight, error_response, json_response, parse_json_body, BoxBody,
};
use crate::server::AppState;
use crate::types::{Result, StampgateError};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterRequest {
    identifier: String,
    password: String,
    #[serde(default = "default_role")]
    role: String,
    #[serde(default)]
    store_id: Option<String>,
}

fn default_role() -> String {
    "user".to_string()
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    identifier: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct VerifyOtpRequest {
    identifier: String,
    code: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    token: String,
    token_type: &'static str,
    expires_in: u64,
    identifier: String,
    role: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MeResponse {
    identifier: String,
    role: String,
    email_verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    store_id: Option<String>,
}

/// Dispatch /auth/* requests. Returns None for paths this module does
/// not know.
pub async fn handle_auth_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Option<Response<BoxBody>> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = match (method, path.as_str()) {
        (Method::OPTIONS, _) => cors_preflight(),
        (Method::POST, "/auth/register") => handle_register(req, state).await,
        (Method::POST, "/auth/login") => handle_login(req, state).await,
        (Method::POST, "/auth/verify-otp") => handle_verify_otp(req, state).await,
        (Method::GET, "/auth/me") => handle_me(req, state).await,
        _ => return None,
    };
    Some(response)
}

async fn handle_register(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    match register(req, state).await {
        Ok(resp) => resp,
        Err(e) => error_response(&e),
    }
}

async fn register(req: Request<Incoming>, state: Arc<AppState>) -> Result<Response<BoxBody>> {
    let body: RegisterRequest = parse_json_body(req).await?;

    if body.identifier.trim().is_empty() {
        return Err(StampgateError::InvalidArgument("identifier is required".to_string()));
    }
    if body.password.len() < 8 {
        return Err(StampgateError::InvalidArgument(
            "password must be at least 8 characters".to_string(),
        ));
    }
    let role = UserRole::parse(&body.role)
        .ok_or_else(|| StampgateError::InvalidArgument(format!("unknown role: {}", body.role)))?;
    if role.can_operate_store() && body.store_id.is_none() {
        return Err(StampgateError::InvalidArgument(
            "store accounts require a storeId".to_string(),
        ));
    }

    let mut user = UserDoc::new(body.identifier.clone(), hash_password(&body.password)?, role);
    user.store_id = body.store_id;

    if !state.store.create_user(user).await? {
        return Err(StampgateError::AlreadyUsed(format!(
            "identifier {} is already registered",
            body.identifier
        )));
    }
    info!(identifier = %body.identifier, role = %role, "account registered");

    // Verification mail is best-effort; the account exists either way
    // and can re-request a code by registering support later
    if let Err(e) = state.otp.issue(&body.identifier).await {
        warn!(identifier = %body.identifier, "failed to send verification code: {}", e);
    }

    Ok(json_response(
        StatusCode::CREATED,
        &serde_json::json!({
            "identifier": body.identifier,
            "role": role.as_str(),
        }),
    ))
}

async fn handle_login(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    match login(req, state).await {
        Ok(resp) => resp,
        Err(e) => error_response(&e),
    }
}

async fn login(req: Request<Incoming>, state: Arc<AppState>) -> Result<Response<BoxBody>> {
    let body: LoginRequest = parse_json_body(req).await?;

    // One error message for unknown accounts and wrong passwords
    let denied = || StampgateError::Unauthenticated("invalid credentials".to_string());

    let user = state.store.find_user(&body.identifier).await?.ok_or_else(denied)?;
    if !user.is_active || !verify_password(&body.password, &user.password_hash)? {
        return Err(denied());
    }

    let token = state.session_jwt.generate_token(&user.identifier, user.role)?;
    info!(identifier = %user.identifier, "login");

    Ok(json_response(
        StatusCode::OK,
        &LoginResponse {
            token,
            token_type: "Bearer",
            expires_in: state.args.jwt_expiry_seconds,
            identifier: user.identifier,
            role: user.role.as_str().to_string(),
        },
    ))
}

async fn handle_verify_otp(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    let body: VerifyOtpRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(&e),
    };

    match state.otp.verify(&body.identifier, &body.code).await {
        Ok(()) => json_response(StatusCode::OK, &serde_json::json!({ "verified": true })),
        Err(e) => error_response(&e),
    }
}

async fn handle_me(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    let claims = match authenticate(&req, &state) {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };

    match state.store.find_user(&claims.sub).await {
        Ok(Some(user)) => json_response(
            StatusCode::OK,
            &MeResponse {
                identifier: user.identifier,
                role: user.role.as_str().to_string(),
                email_verified: user.email_verified,
                store_id: user.store_id,
            },
        ),
        Ok(None) => error_response(&StampgateError::NotFound(format!(
            "no account for {}",
            claims.sub
        ))),
        Err(e) => error_response(&e),
    }
}
