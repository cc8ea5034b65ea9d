//! Achievement event record and its summary payload
//!
//! Keyed by (user, originating transaction id) - the durable
//! idempotency marker and the payload the client reads to show
//! "you leveled up / earned a badge" UI. Created at most once per
//! transaction id; only the seen timestamp ever changes afterward.

use bson::{doc, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;
use crate::db::schemas::value_event::ValueEventType;

/// Collection name for achievement event records
pub const ACHIEVEMENT_EVENT_COLLECTION: &str = "achievement_events";

/// Experience breakdown by source
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct XpBreakdown {
    pub points: i64,
    pub stamp_punch: i64,
    pub card_complete: i64,
}

/// One badge in a grant list
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct BadgeGrant {
    pub badge_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
    #[serde(default)]
    pub display_order: i64,
    /// True when the user already owned the badge before this
    /// evaluation; the grant is still reported so the caller can
    /// decide whether to re-display it
    pub already_owned: bool,
}

/// The gamification outcome of processing one value event
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AchievementSummary {
    pub points_awarded: i64,
    pub stamps_added: i32,
    pub stamps_after: i32,
    pub card_completed: bool,
    pub xp_added: i64,
    pub xp_breakdown: XpBreakdown,
    pub experience_after: i64,
    pub level_after: u32,
    #[serde(default)]
    pub badges: Vec<BadgeGrant>,
}

impl AchievementSummary {
    /// Zero-effect summary, returned when an idempotency marker
    /// short-circuits processing and no stored summary exists
    /// (markers predating summary storage)
    pub fn zeroed() -> Self {
        Self {
            points_awarded: 0,
            stamps_added: 0,
            stamps_after: 0,
            card_completed: false,
            xp_added: 0,
            xp_breakdown: XpBreakdown::default(),
            experience_after: 0,
            level_after: 1,
            badges: Vec::new(),
        }
    }
}

/// Durable, queryable record of one processed value event
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AchievementEventDoc {
    pub user_id: String,

    /// Originating transaction id (idempotency key together with
    /// user_id)
    pub transaction_id: String,

    pub event_type: ValueEventType,

    /// Echoed store info
    pub store_id: String,
    #[serde(default)]
    pub store_name: String,

    pub summary: AchievementSummary,

    pub created_at: DateTime,

    /// Set by client acknowledgment; only ever moves from null to
    /// non-null
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seen_at: Option<DateTime>,
}

impl IntoIndexes for AchievementEventDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "user_id": 1, "transaction_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("user_transaction_unique".to_string())
                        .build(),
                ),
            ),
            // Unseen feed query
            (
                doc! { "user_id": 1, "seen_at": 1, "created_at": -1 },
                Some(
                    IndexOptions::builder()
                        .name("user_seen_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}
