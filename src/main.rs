//! Stampgate - loyalty backend for QR store check-ins

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stampgate::{
    auth::JwtValidator,
    badges::BadgeEvaluator,
    config::Args,
    db::MongoClient,
    ledger::AchievementLedger,
    notify::{LogNotifier, Notifier, WebhookNotifier},
    otp::{LogMailer, OtpService},
    qr::TokenService,
    server::{self, AppState},
    store::{LoyaltyStore, MemoryStore, MongoStore},
    worker,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("stampgate={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Stampgate - QR check-in loyalty core");
    info!("======================================");
    info!("Node ID: {}", args.node_id);
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("MongoDB: {}", args.mongodb_uri);
    info!("QR token TTL: {}s", args.qr_token_ttl_seconds);
    info!("Timezone offset: UTC{:+}", args.tz_offset_hours);
    info!("======================================");

    // Connect to MongoDB (optional in dev mode)
    let mongo = match MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await {
        Ok(client) => {
            info!("MongoDB connected successfully");
            Some(client)
        }
        Err(e) => {
            if args.dev_mode {
                warn!("MongoDB connection failed (dev mode, using memory store): {}", e);
                None
            } else {
                error!("MongoDB connection failed: {}", e);
                std::process::exit(1);
            }
        }
    };

    let mongo_connected = mongo.is_some();
    let store: Arc<dyn LoyaltyStore> = match mongo {
        Some(client) => Arc::new(MongoStore::new(client).await?),
        None => Arc::new(MemoryStore::new()),
    };

    let secret = args.jwt_secret();
    let tokens = TokenService::new(&secret, args.qr_token_ttl_seconds);
    let session_jwt = if args.dev_mode && args.jwt_secret.is_none() {
        JwtValidator::new_dev()
    } else {
        JwtValidator::new(&secret, args.jwt_expiry_seconds as i64)?
    };

    let evaluator = BadgeEvaluator::new(Arc::clone(&store), args.tz_offset());
    let ledger = Arc::new(AchievementLedger::new(Arc::clone(&store), evaluator));
    let otp = OtpService::new(Arc::clone(&store), Arc::new(LogMailer));

    let notifier: Arc<dyn Notifier> = match &args.notify_webhook_url {
        Some(url) => {
            info!("Achievement notifications: webhook {}", url);
            Arc::new(WebhookNotifier::new(url.clone()))
        }
        None => {
            info!("Achievement notifications: log only");
            Arc::new(LogNotifier)
        }
    };

    // Backstop for value events whose inline processing died mid-flight
    worker::spawn_dispatch_task(
        Arc::clone(&store),
        Arc::clone(&ledger),
        Arc::clone(&notifier),
        Duration::from_secs(args.dispatch_interval_seconds),
    );

    let state = Arc::new(AppState {
        args,
        store,
        tokens,
        session_jwt,
        ledger,
        otp,
        notifier,
        mongo_connected,
        started_at: std::time::Instant::now(),
    });

    server::run(state).await?;
    Ok(())
}
