//! Health check endpoints
//!
//! Kubernetes-style probes:
//! - /health, /healthz - liveness (is the service running?)
//! - /ready, /readyz   - readiness (is storage reachable?)
//!
//! In dev mode the memory store counts as reachable, so readiness is
//! always green there.

use hyper::{Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;

use crate::routes::{json_response, BoxBody};
use crate::server::AppState;

#[derive(Serialize)]
struct HealthResponse {
    healthy: bool,
    status: &'static str,
    version: &'static str,
    /// Seconds since process start
    uptime: u64,
    mode: &'static str,
    #[serde(rename = "nodeId")]
    node_id: String,
    storage: StorageHealth,
    timestamp: String,
}

#[derive(Serialize)]
struct StorageHealth {
    backend: &'static str,
    connected: bool,
}

fn build_health_response(state: &AppState) -> HealthResponse {
    HealthResponse {
        healthy: true,
        status: "online",
        version: env!("CARGO_PKG_VERSION"),
        uptime: state.started_at.elapsed().as_secs(),
        mode: if state.args.dev_mode {
            "development"
        } else {
            "production"
        },
        node_id: state.args.node_id.to_string(),
        storage: StorageHealth {
            backend: if state.mongo_connected { "mongodb" } else { "memory" },
            connected: true,
        },
        timestamp: chrono::Utc::now().to_rfc3339(),
    }
}

/// Liveness probe: 200 whenever the process is serving
pub fn health_check(state: Arc<AppState>) -> Response<BoxBody> {
    json_response(StatusCode::OK, &build_health_response(&state))
}

/// Readiness probe: 200 when a storage backend is attached.
/// Production without MongoDB never reaches this point (startup
/// fails), so this mirrors liveness unless the topology changes.
pub fn readiness_check(state: Arc<AppState>) -> Response<BoxBody> {
    let ready = state.mongo_connected || state.args.dev_mode;
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    json_response(status, &serde_json::json!({ "ready": ready }))
}

/// Version info for deployment verification
pub fn version_info() -> Response<BoxBody> {
    json_response(
        StatusCode::OK,
        &serde_json::json!({
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        }),
    )
}
