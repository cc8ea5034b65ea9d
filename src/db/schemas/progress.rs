//! User experience/level progress document

use bson::{doc, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;

/// Collection name for user progress
pub const USER_PROGRESS_COLLECTION: &str = "user_progress";

/// Per-user experience and derived level
///
/// `level` is always `level_from_total_experience(experience)`; both
/// are written together inside the achievement transaction.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct UserProgressDoc {
    pub user_id: String,

    /// Total experience, clamped to the level-cap bound
    pub experience: i64,

    /// Derived level in [1, LEVEL_MAX]
    pub level: u32,

    pub updated_at: DateTime,
}

impl IntoIndexes for UserProgressDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "user_id": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("user_id_unique".to_string())
                    .build(),
            ),
        )]
    }
}
