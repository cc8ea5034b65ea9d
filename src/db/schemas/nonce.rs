//! Consumed QR nonce record
//!
//! Created exactly once, atomically, the first time a token with this
//! jti passes verification. Existence of the record is the sole
//! replay guard; the unique index enforces the create-if-absent
//! contract.

use bson::{doc, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;

/// Collection name for consumed nonces (jti records)
pub const CONSUMED_NONCE_COLLECTION: &str = "qr_jti";

/// One-time-use nonce consumption marker
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ConsumedNonceDoc {
    /// The token's jti (128-bit random hex)
    pub jti: String,

    /// When the token was consumed
    pub used_at: DateTime,

    /// Store that verified the token
    pub store_id: String,

    /// User the token was issued for
    pub uid: String,

    /// Device binding carried by the token, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

impl IntoIndexes for ConsumedNonceDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "jti": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("jti_unique".to_string())
                    .build(),
            ),
        )]
    }
}
