//! Email verification one-time codes
//!
//! A six-digit code with a short expiry, stored keyed by account
//! identifier. Issuing overwrites any outstanding code; verification
//! consumes the code regardless of outcome, so each code gets one
//! guess.

use std::sync::Arc;

use async_trait::async_trait;
use bson::DateTime;
use rand::Rng;
use tracing::info;

use crate::db::schemas::OtpDoc;
use crate::store::LoyaltyStore;
use crate::types::{Result, StampgateError};

/// Code lifetime
pub const OTP_TTL_SECS: i64 = 600;

/// Outbound mail delivery seam
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_otp(&self, recipient: &str, code: &str) -> Result<()>;
}

/// Logs the code instead of sending mail. Used in dev mode and
/// wherever no mail provider is wired up.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_otp(&self, recipient: &str, code: &str) -> Result<()> {
        info!(recipient = %recipient, code = %code, "verification code (log mailer)");
        Ok(())
    }
}

pub struct OtpService {
    store: Arc<dyn LoyaltyStore>,
    mailer: Arc<dyn Mailer>,
}

impl OtpService {
    pub fn new(store: Arc<dyn LoyaltyStore>, mailer: Arc<dyn Mailer>) -> Self {
        Self { store, mailer }
    }

    /// Issue a fresh code for `identifier`, replacing any outstanding
    /// one, and hand it to the mailer.
    pub async fn issue(&self, identifier: &str) -> Result<()> {
        let code = format!("{:06}", rand::thread_rng().gen_range(0..1_000_000u32));
        let now = DateTime::now();
        self.store
            .put_otp(OtpDoc {
                identifier: identifier.to_string(),
                code: code.clone(),
                expires_at: DateTime::from_millis(now.timestamp_millis() + OTP_TTL_SECS * 1000),
                created_at: now,
            })
            .await?;
        self.mailer.send_otp(identifier, &code).await
    }

    /// Consume the outstanding code for `identifier` and, when it
    /// matches and has not expired, mark the account verified.
    pub async fn verify(&self, identifier: &str, code: &str) -> Result<()> {
        let stored = self
            .store
            .take_otp(identifier)
            .await?
            .ok_or_else(|| StampgateError::InvalidArgument("no verification code outstanding".to_string()))?;

        if stored.expires_at.timestamp_millis() < DateTime::now().timestamp_millis() {
            return Err(StampgateError::InvalidArgument(
                "verification code expired".to_string(),
            ));
        }
        if !codes_match(&stored.code, code) {
            return Err(StampgateError::InvalidArgument(
                "verification code mismatch".to_string(),
            ));
        }

        self.store.mark_user_verified(identifier).await
    }
}

/// Constant-time code comparison. The running time depends only on the
/// length of the submitted code, not on which digits match.
fn codes_match(stored: &str, submitted: &str) -> bool {
    if stored.len() != submitted.len() {
        return false;
    }
    stored
        .bytes()
        .zip(submitted.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::{UserDoc, UserRole};
    use crate::store::MemoryStore;

    fn service(store: Arc<MemoryStore>) -> OtpService {
        OtpService::new(store, Arc::new(LogMailer))
    }

    async fn register(store: &MemoryStore, identifier: &str) {
        store
            .create_user(UserDoc::new(
                identifier.to_string(),
                "hash".to_string(),
                UserRole::User,
            ))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_issue_then_verify_marks_user() {
        let store = MemoryStore::shared();
        register(&store, "user@example.com").await;
        let otp = service(Arc::clone(&store));

        otp.issue("user@example.com").await.unwrap();
        let code = store.take_otp("user@example.com").await.unwrap().unwrap();
        // Put it back so verify can consume it
        store.put_otp(code.clone()).await.unwrap();

        otp.verify("user@example.com", &code.code).await.unwrap();
        let user = store.find_user("user@example.com").await.unwrap().unwrap();
        assert!(user.email_verified);
    }

    #[tokio::test]
    async fn test_wrong_code_consumes_and_fails() {
        let store = MemoryStore::shared();
        register(&store, "user@example.com").await;
        let otp = service(Arc::clone(&store));

        otp.issue("user@example.com").await.unwrap();
        assert!(otp.verify("user@example.com", "000000").await.is_err());

        // Code was consumed by the failed attempt
        assert!(store.take_otp("user@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_code_rejected() {
        let store = MemoryStore::shared();
        register(&store, "user@example.com").await;
        let otp = service(Arc::clone(&store));

        let past = DateTime::from_millis(DateTime::now().timestamp_millis() - 1000);
        store
            .put_otp(OtpDoc {
                identifier: "user@example.com".to_string(),
                code: "123456".to_string(),
                expires_at: past,
                created_at: past,
            })
            .await
            .unwrap();

        let err = otp.verify("user@example.com", "123456").await.unwrap_err();
        assert!(matches!(err, StampgateError::InvalidArgument(_)));
    }

    #[test]
    fn test_codes_match_compares_full_length() {
        assert!(codes_match("123456", "123456"));
        // A mismatch anywhere fails, first digit or last
        assert!(!codes_match("123456", "023456"));
        assert!(!codes_match("123456", "123450"));
        assert!(!codes_match("123456", "12345"));
        assert!(!codes_match("", "123456"));
    }
}
