//! Check-in record
//!
//! Written after a QR token is verified and its nonce consumed. The
//! business effects (stamps, points, badges) flow through the value
//! event keyed by the same jti, not through this record.

use bson::{doc, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;

/// Collection name for check-ins
pub const CHECK_IN_COLLECTION: &str = "check_ins";

/// One verified store visit
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CheckInDoc {
    pub user_id: String,
    pub store_id: String,

    /// jti of the consumed QR token
    pub jti: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,

    pub timestamp: DateTime,
}

impl IntoIndexes for CheckInDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "user_id": 1, "timestamp": -1 },
                Some(
                    IndexOptions::builder()
                        .name("user_time_index".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "store_id": 1, "timestamp": -1 },
                Some(
                    IndexOptions::builder()
                        .name("store_time_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}
