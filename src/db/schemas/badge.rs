//! Badge configuration and ownership documents
//!
//! Badges are operator-managed configuration: the evaluator treats
//! the collection as read-only input, re-read on every evaluation.
//! A UserBadge exists iff the badge is owned; it captures a
//! denormalized copy of display metadata at grant time.

use bson::{doc, Bson, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;

/// Collection name for badge configurations
pub const BADGE_COLLECTION: &str = "badges";

/// Collection name for owned badges
pub const USER_BADGE_COLLECTION: &str = "user_badges";

/// Operator-configured badge definition
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct BadgeDoc {
    pub badge_id: String,

    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,

    /// Sort key for grant lists; missing treated as 0
    #[serde(default)]
    pub display_order: i64,

    #[serde(default)]
    pub is_active: bool,

    /// Condition rule, arbitrary operator-edited JSON shape. Parsed
    /// tolerantly at the evaluator boundary; malformed conditions
    /// make the badge unsatisfiable, never an error.
    pub condition: Bson,
}

impl IntoIndexes for BadgeDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "badge_id": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("badge_id_unique".to_string())
                    .build(),
            ),
        )]
    }
}

/// Ownership record, created at most once per (user, badge)
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct UserBadgeDoc {
    pub user_id: String,
    pub badge_id: String,

    /// Display metadata copied from the badge at grant time
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
    #[serde(default)]
    pub display_order: i64,

    pub granted_at: DateTime,
}

impl UserBadgeDoc {
    /// Build a grant record from the badge definition
    pub fn from_badge(user_id: &str, badge: &BadgeDoc) -> Self {
        Self {
            user_id: user_id.to_string(),
            badge_id: badge.badge_id.clone(),
            name: badge.name.clone(),
            icon_url: badge.icon_url.clone(),
            display_order: badge.display_order,
            granted_at: DateTime::now(),
        }
    }
}

impl IntoIndexes for UserBadgeDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "user_id": 1, "badge_id": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("user_badge_unique".to_string())
                    .build(),
            ),
        )]
    }
}
