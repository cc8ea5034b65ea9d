//! User account document
//!
//! Credentials plus the role used for endpoint authorization. Store
//! and company accounts are the only roles allowed to verify QR
//! tokens and award points.

use bson::{doc, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::db::mongo::IntoIndexes;

/// Collection name for users
pub const USER_COLLECTION: &str = "users";

/// Account role carried in session token claims
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    /// End user collecting stamps and points
    User,
    /// Store terminal operator
    Store,
    /// Company operator managing multiple stores
    Company,
}

impl UserRole {
    /// Whether this role may verify QR tokens and award points
    pub fn can_operate_store(&self) -> bool {
        matches!(self, UserRole::Store | UserRole::Company)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::User => "user",
            UserRole::Store => "store",
            UserRole::Company => "company",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(UserRole::User),
            "store" => Some(UserRole::Store),
            "company" => Some(UserRole::Company),
            _ => None,
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User account stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct UserDoc {
    /// User identifier (email)
    pub identifier: String,

    /// Argon2 password hash (PHC format)
    pub password_hash: String,

    pub role: UserRole,

    /// Store this account operates, for store-role users
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_id: Option<String>,

    /// Set once OTP email verification succeeds
    #[serde(default)]
    pub email_verified: bool,

    #[serde(default = "default_true")]
    pub is_active: bool,

    pub created_at: DateTime,
}

fn default_true() -> bool {
    true
}

impl UserDoc {
    pub fn new(identifier: String, password_hash: String, role: UserRole) -> Self {
        Self {
            identifier,
            password_hash,
            role,
            store_id: None,
            email_verified: false,
            is_active: true,
            created_at: DateTime::now(),
        }
    }
}

impl IntoIndexes for UserDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "identifier": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("identifier_unique".to_string())
                    .build(),
            ),
        )]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_permissions() {
        assert!(!UserRole::User.can_operate_store());
        assert!(UserRole::Store.can_operate_store());
        assert!(UserRole::Company.can_operate_store());
    }

    #[test]
    fn test_role_parse_round_trip() {
        for role in [UserRole::User, UserRole::Store, UserRole::Company] {
            assert_eq!(UserRole::parse(role.as_str()), Some(role));
        }
        assert_eq!(UserRole::parse("admin"), None);
    }
}
