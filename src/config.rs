//! Configuration for Stampgate
//!
//! CLI arguments and environment variable handling using clap.
//! Resolved once at startup and passed explicitly into service
//! constructors - core logic never reads ambient globals.

use chrono::FixedOffset;
use clap::Parser;
use std::net::SocketAddr;
use uuid::Uuid;

/// Stampgate - loyalty backend for QR store check-ins
#[derive(Parser, Debug, Clone)]
#[command(name = "stampgate")]
#[command(about = "QR check-in tokens, stamp cards, and achievement processing")]
pub struct Args {
    /// Unique node identifier for this instance
    #[arg(long, env = "NODE_ID", default_value_t = Uuid::new_v4())]
    pub node_id: Uuid,

    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Enable development mode (memory store fallback, relaxed role checks)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "stampgate")]
    pub mongodb_db: String,

    /// Symmetric secret for token signing (required in production)
    /// Shared only among issuing/verifying processes.
    #[arg(long, env = "JWT_SECRET")]
    pub jwt_secret: Option<String>,

    /// Session token expiry in seconds
    #[arg(long, env = "JWT_EXPIRY_SECONDS", default_value = "3600")]
    pub jwt_expiry_seconds: u64,

    /// QR check-in token time-to-live in seconds
    #[arg(long, env = "QR_TOKEN_TTL_SECONDS", default_value = "60")]
    pub qr_token_ttl_seconds: u64,

    /// Points awarded per QR check-in
    #[arg(long, env = "CHECK_IN_POINTS", default_value = "10")]
    pub check_in_points: i64,

    /// Fixed UTC offset (hours) for period calculations and daily stats
    /// Default +9 (Asia/Tokyo, the original deployment region)
    #[arg(long, env = "TZ_OFFSET_HOURS", default_value = "9", allow_hyphen_values = true)]
    pub tz_offset_hours: i32,

    /// Poll interval for the value-event dispatcher task, in seconds
    #[arg(long, env = "DISPATCH_INTERVAL_SECONDS", default_value = "15")]
    pub dispatch_interval_seconds: u64,

    /// Webhook URL for push notification fan-out (optional)
    /// When unset, achievement notifications are logged only.
    #[arg(long, env = "NOTIFY_WEBHOOK_URL")]
    pub notify_webhook_url: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// Get effective signing secret (uses default in dev mode)
    pub fn jwt_secret(&self) -> String {
        if self.dev_mode {
            self.jwt_secret
                .clone()
                .unwrap_or_else(|| "dev-only-insecure-secret".to_string())
        } else {
            self.jwt_secret
                .clone()
                .expect("JWT_SECRET is required in production mode")
        }
    }

    /// Fixed service timezone offset
    pub fn tz_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.tz_offset_hours * 3600)
            .unwrap_or_else(|| FixedOffset::east_opt(0).expect("zero offset is valid"))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.dev_mode && self.jwt_secret.is_none() {
            return Err("JWT_SECRET is required in production mode".to_string());
        }

        if self.qr_token_ttl_seconds == 0 {
            return Err("QR_TOKEN_TTL_SECONDS must be greater than zero".to_string());
        }

        if self.tz_offset_hours < -12 || self.tz_offset_hours > 14 {
            return Err("TZ_OFFSET_HOURS must be within [-12, 14]".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dev_args() -> Args {
        Args::parse_from(["stampgate", "--dev-mode"])
    }

    #[test]
    fn test_dev_mode_secret_fallback() {
        let args = dev_args();
        assert_eq!(args.jwt_secret(), "dev-only-insecure-secret");
    }

    #[test]
    fn test_validate_requires_secret_in_production() {
        let args = Args::parse_from(["stampgate"]);
        assert!(args.validate().is_err());

        let args = Args::parse_from(["stampgate", "--jwt-secret", "s3cret"]);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_tz_offset() {
        let args = dev_args();
        assert_eq!(args.tz_offset().local_minus_utc(), 9 * 3600);
    }

    #[test]
    fn test_tz_offset_bounds() {
        let args = Args::parse_from(["stampgate", "--dev-mode", "--tz-offset-hours", "15"]);
        assert!(args.validate().is_err());
    }
}
