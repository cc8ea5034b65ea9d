//! Email verification OTP document
//!
//! One active code per identifier; issuing a new code replaces any
//! previous one. Codes expire after ten minutes and are deleted on
//! first verification attempt.

use bson::{doc, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;

/// Collection name for email OTPs
pub const OTP_COLLECTION: &str = "email_otps";

/// A pending one-time verification code
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct OtpDoc {
    /// User identifier (email) the code was sent to
    pub identifier: String,

    /// Six-digit numeric code
    pub code: String,

    pub expires_at: DateTime,

    pub created_at: DateTime,
}

impl IntoIndexes for OtpDoc {
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
