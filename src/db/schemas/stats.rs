//! Daily check-in statistics
//!
//! Keyed by local date string (YYYY-MM-DD in the service timezone).
//! Merged best-effort after each check-in; a failed merge is logged
//! and never blocks the check-in itself.

use bson::{doc, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;

/// Collection name for daily stats
pub const DAILY_STATS_COLLECTION: &str = "daily_stats";

/// Aggregated check-ins for one local day
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct DailyStatsDoc {
    /// YYYY-MM-DD in the service timezone
    pub date: String,

    pub total_check_ins: i64,

    /// Distinct users seen this day
    #[serde(default)]
    pub unique_users: Vec<String>,

    pub last_updated: DateTime,
}

impl IntoIndexes for DailyStatsDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "date": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("date_unique".to_string())
                    .build(),
            ),
        )]
    }
}
