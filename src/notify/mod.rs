//! Outbound achievement notifications
//!
//! Best-effort by contract: delivery failures are logged and never
//! fail the request that produced the achievement.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::db::schemas::AchievementSummary;

/// Notification delivery seam
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver an achievement notification. Implementations absorb
    /// their own failures; callers never see an error.
    async fn notify_achievement(&self, user_id: &str, summary: &AchievementSummary);
}

/// Logs notifications instead of delivering them
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_achievement(&self, user_id: &str, summary: &AchievementSummary) {
        debug!(
            user_id = %user_id,
            xp_added = summary.xp_added,
            level_after = summary.level_after,
            badges = summary.badges.len(),
            "achievement notification (log notifier)",
        );
    }
}

/// POSTs each notification as JSON to a configured webhook URL
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify_achievement(&self, user_id: &str, summary: &AchievementSummary) {
        let payload = serde_json::json!({
            "userId": user_id,
            "summary": summary,
        });
        match self.client.post(&self.url).json(&payload).send().await {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) => warn!(
                user_id = %user_id,
                status = %resp.status(),
                "achievement webhook rejected",
            ),
            Err(e) => warn!(user_id = %user_id, "achievement webhook failed: {}", e),
        }
    }
}
