//! Value event document
//!
//! The originating record whose processing must be idempotent: a
//! point-award transaction or a stamp punch, keyed by a unique
//! transaction identifier. The processed marker and the stored
//! summary are the inner idempotency guard for the achievement
//! ledger.

use bson::{doc, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;
use crate::db::schemas::achievement::AchievementSummary;

/// Collection name for value events
pub const VALUE_EVENT_COLLECTION: &str = "transactions";

/// Discriminator for the two kinds of value event
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ValueEventType {
    PointAward,
    StampPunch,
}

impl ValueEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueEventType::PointAward => "point_award",
            ValueEventType::StampPunch => "stamp_punch",
        }
    }
}

/// A point-award or stamp-punch occurrence awaiting (or past)
/// achievement processing
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ValueEventDoc {
    /// Unique transaction identifier (the idempotency key)
    pub transaction_id: String,

    pub user_id: String,
    pub store_id: String,

    /// Store display name echoed into achievement records
    #[serde(default)]
    pub store_name: String,

    pub event_type: ValueEventType,

    /// Awarded points (may be zero)
    pub points: i64,

    /// Weekday in the service timezone, 0 = Sunday .. 6 = Saturday.
    /// Denormalized at creation so day-of-week badge queries stay
    /// index-friendly.
    pub weekday: i32,

    /// Set inside the achievement transaction; guards re-application
    #[serde(default)]
    pub processed: bool,

    /// Summary stored when the event was processed (audit + outer
    /// guard replay response)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<AchievementSummary>,

    pub created_at: DateTime,
}

impl IntoIndexes for ValueEventDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "transaction_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("transaction_id_unique".to_string())
                        .build(),
                ),
            ),
            // Badge evaluation counts stamp events per user over time
            // windows, optionally filtered by weekday or store
            (
                doc! { "user_id": 1, "event_type": 1, "created_at": -1 },
                Some(
                    IndexOptions::builder()
                        .name("user_type_time_index".to_string())
                        .build(),
                ),
            ),
            // Dispatcher scans for unprocessed events
            (
                doc! { "processed": 1, "created_at": 1 },
                Some(
                    IndexOptions::builder()
                        .name("processed_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}
