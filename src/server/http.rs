//! HTTP server implementation
//!
//! hyper http1 with TokioIo and manual method/path dispatch; one
//! spawned connection task per accepted socket.

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::auth::JwtValidator;
use crate::config::Args;
use crate::ledger::AchievementLedger;
use crate::notify::Notifier;
use crate::otp::OtpService;
use crate::qr::TokenService;
use crate::routes::{self, cors_preflight, error_response, BoxBody};
use crate::store::LoyaltyStore;
use crate::types::StampgateError;

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub store: Arc<dyn LoyaltyStore>,
    /// QR check-in token service
    pub tokens: TokenService,
    /// Session JWT validation for the HTTP surface
    pub session_jwt: JwtValidator,
    pub ledger: Arc<AchievementLedger>,
    pub otp: OtpService,
    pub notifier: Arc<dyn Notifier>,
    /// True when backed by MongoDB rather than the memory store
    pub mongo_connected: bool,
    pub started_at: Instant,
}

/// Start the HTTP server
pub async fn run(state: Arc<AppState>) -> crate::types::Result<()> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!(
        "Stampgate listening on {} as node {}",
        state.args.listen, state.args.node_id
    );
    if state.args.dev_mode {
        warn!("Development mode enabled - role checks relaxed, insecure defaults in use");
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                        debug!("connection error from {}: {}", addr, err);
                    }
                });
            }
            Err(e) => {
                warn!("accept failed: {}", e);
            }
        }
    }
}

async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> Result<Response<BoxBody>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    debug!("[{}] {} {}", addr, method, path);

    if path.starts_with("/auth") {
        if let Some(response) = routes::handle_auth_request(req, Arc::clone(&state)).await {
            return Ok(response);
        }
        return Ok(not_found(&path));
    }

    let response = match (method, path.as_str()) {
        (Method::OPTIONS, _) => cors_preflight(),

        (Method::GET, "/health") | (Method::GET, "/healthz") => {
            routes::health_check(Arc::clone(&state))
        }
        (Method::GET, "/ready") | (Method::GET, "/readyz") => {
            routes::readiness_check(Arc::clone(&state))
        }
        (Method::GET, "/version") => routes::version_info(),

        (Method::POST, "/qr/issue") => routes::handle_qr_issue(req, state).await,
        (Method::POST, "/qr/verify") => routes::handle_qr_verify(req, state).await,

        (Method::POST, "/points/award") => routes::handle_award_points(req, state).await,
        (Method::GET, "/achievements/unseen") => {
            routes::handle_unseen_achievements(req, state).await
        }

        (Method::POST, path_str) => match parse_seen_path(path_str) {
            Some(transaction_id) => {
                let transaction_id = transaction_id.to_string();
                routes::handle_achievement_seen(req, state, &transaction_id).await
            }
            None => not_found(&path),
        },

        (Method::GET, path_str) => match path_str.strip_prefix("/stamps/") {
            Some(store_id) if !store_id.is_empty() && !store_id.contains('/') => {
                let store_id = store_id.to_string();
                routes::handle_stamp_progress(req, state, &store_id).await
            }
            _ => not_found(&path),
        },

        _ => not_found(&path),
    };

    Ok(response)
}

/// Match /achievements/{transactionId}/seen
fn parse_seen_path(path: &str) -> Option<&str> {
    let rest = path.strip_prefix("/achievements/")?;
    let transaction_id = rest.strip_suffix("/seen")?;
    (!transaction_id.is_empty() && !transaction_id.contains('/')).then_some(transaction_id)
}

fn not_found(path: &str) -> Response<BoxBody> {
    error_response(&StampgateError::NotFound(format!("no route for {}", path)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_seen_path() {
        assert_eq!(parse_seen_path("/achievements/txn-1/seen"), Some("txn-1"));
        assert_eq!(parse_seen_path("/achievements//seen"), None);
        assert_eq!(parse_seen_path("/achievements/txn-1"), None);
        assert_eq!(parse_seen_path("/achievements/a/b/seen"), None);
        assert_eq!(parse_seen_path("/stamps/store-1"), None);
    }
}
