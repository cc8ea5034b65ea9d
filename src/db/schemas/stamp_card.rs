//! Stamp card progress document
//!
//! Per (user, store) counter gamifying repeat visits. Stamps never
//! decrease except by external reset; completion is re-derived from
//! the before/after transition inside the achievement transaction,
//! not tracked as a flag.

use bson::{doc, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;

/// Collection name for stamp cards
pub const STAMP_CARD_COLLECTION: &str = "stamp_cards";

/// Per (user, store) stamp card progress
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct StampCardProgressDoc {
    pub user_id: String,
    pub store_id: String,

    /// Clamped to [0, MAX_STAMPS]
    pub stamps: i32,

    pub last_visited_at: DateTime,
}

impl IntoIndexes for StampCardProgressDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "user_id": 1, "store_id": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("user_store_unique".to_string())
                    .build(),
            ),
        )]
    }
}
