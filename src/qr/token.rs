//! QR token issuance and verification
//!
//! HS256 JWTs with a fixed audience and issuer, a 128-bit random jti
//! for replay prevention, and a schema version pinned to 1. Issuance
//! has no side effects; consumption of the jti is a separate atomic
//! step against the store (see `LoyaltyStore::consume_nonce`).

use chrono::Utc;
use jsonwebtoken::{
    decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::types::{Result, StampgateError};

/// Audience embedded in every QR token
pub const QR_AUDIENCE: &str = "stampgate/qr";

/// Issuer embedded in every QR token
pub const QR_ISSUER: &str = "stampgate-core";

/// Supported token schema version; verification rejects any other value
pub const QR_TOKEN_VERSION: u32 = 1;

/// Clock skew tolerance applied to expiry checks, in seconds
pub const CLOCK_SKEW_SECS: u64 = 5;

/// Claims carried by a QR check-in token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QrClaims {
    /// User identifier
    pub sub: String,
    /// Issued at (Unix timestamp, seconds)
    pub iat: i64,
    /// Expiration (Unix timestamp, seconds)
    pub exp: i64,
    /// 128-bit random hex nonce, unique per issuance
    pub jti: String,
    /// Token schema version
    pub ver: u32,
    /// Audience
    pub aud: String,
    /// Issuer
    pub iss: String,
    /// Optional opaque device binding
    #[serde(rename = "deviceId", skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

/// Result of token issuance
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedToken {
    /// The signed credential
    pub token: String,
    /// Expiry in epoch milliseconds (client display convenience)
    pub expires_at: i64,
    /// The replay-prevention nonce
    pub jti: String,
}

/// Context recorded when a nonce is consumed
#[derive(Debug, Clone)]
pub struct NonceContext {
    /// Store that verified the token
    pub store_id: String,
    /// User the token was issued for
    pub subject: String,
    /// Device binding carried by the token, if any
    pub device_id: Option<String>,
}

/// QR token issuance and verification service
///
/// Holds the symmetric signing secret. Constructed once at startup
/// from the resolved configuration.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    default_ttl_secs: u64,
}

impl TokenService {
    pub fn new(secret: &str, default_ttl_secs: u64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            default_ttl_secs,
        }
    }

    /// Issue a fresh token for `subject`
    ///
    /// `custom_expires_at` overrides the default expiry (absolute Unix
    /// seconds). No persistence happens at issuance time.
    pub fn issue(
        &self,
        subject: &str,
        device_id: Option<String>,
        custom_expires_at: Option<i64>,
    ) -> Result<IssuedToken> {
        let now = Utc::now().timestamp();
        let exp = custom_expires_at.unwrap_or(now + self.default_ttl_secs as i64);
        let jti = generate_nonce();

        let claims = QrClaims {
            sub: subject.to_string(),
            iat: now,
            exp,
            jti: jti.clone(),
            ver: QR_TOKEN_VERSION,
            aud: QR_AUDIENCE.to_string(),
            iss: QR_ISSUER.to_string(),
            device_id,
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| StampgateError::Auth(format!("Failed to sign token: {}", e)))?;

        Ok(IssuedToken {
            token,
            expires_at: exp * 1000,
            jti,
        })
    }

    /// Verify a presented token
    ///
    /// Validates signature, audience, issuer, schema version, and the
    /// expiry window with clock skew tolerance. Returns the decoded
    /// claims on success. Does NOT consume the nonce - that is a
    /// separate atomic step so the caller controls the consumption
    /// context.
    pub fn verify(&self, token: &str) -> Result<QrClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = CLOCK_SKEW_SECS;
        validation.set_audience(&[QR_AUDIENCE]);
        validation.set_issuer(&[QR_ISSUER]);

        let data = decode::<QrClaims>(token, &self.decoding_key, &validation)
            .map_err(map_verification_error)?;

        let claims = data.claims;

        if claims.sub.is_empty() || claims.jti.is_empty() {
            return Err(StampgateError::InvalidToken(
                "missing required claims (sub, jti)".into(),
            ));
        }

        if claims.ver != QR_TOKEN_VERSION {
            return Err(StampgateError::InvalidToken(format!(
                "unsupported token version {}",
                claims.ver
            )));
        }

        Ok(claims)
    }
}

/// Generate a 128-bit random hex nonce
fn generate_nonce() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Map jsonwebtoken failures to distinguishable invalid-token reasons
///
/// The reason string is for operators; it never includes the secret
/// or the token contents.
fn map_verification_error(e: jsonwebtoken::errors::Error) -> StampgateError {
    use jsonwebtoken::errors::ErrorKind;

    let reason = match e.kind() {
        ErrorKind::ExpiredSignature => "token expired".to_string(),
        ErrorKind::InvalidSignature => "signature mismatch".to_string(),
        ErrorKind::InvalidAudience => "audience mismatch".to_string(),
        ErrorKind::InvalidIssuer => "issuer mismatch".to_string(),
        ErrorKind::ImmatureSignature => "token not yet valid".to_string(),
        ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Json(_) | ErrorKind::Utf8(_) => {
            "malformed token".to_string()
        }
        other => format!("verification failed: {:?}", other),
    };

    StampgateError::InvalidToken(reason)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new("test-secret", 60)
    }

    #[test]
    fn test_issue_then_verify_round_trip() {
        let svc = service();
        let issued = svc
            .issue("user-1", Some("device-abc".into()), None)
            .unwrap();

        assert_eq!(issued.jti.len(), 32); // 128-bit hex

        let claims = svc.verify(&issued.token).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.jti, issued.jti);
        assert_eq!(claims.ver, QR_TOKEN_VERSION);
        assert_eq!(claims.device_id.as_deref(), Some("device-abc"));
        assert_eq!(issued.expires_at, claims.exp * 1000);
    }

    #[test]
    fn test_unique_nonces() {
        let svc = service();
        let a = svc.issue("user-1", None, None).unwrap();
        let b = svc.issue("user-1", None, None).unwrap();
        assert_ne!(a.jti, b.jti);
    }

    #[test]
    fn test_expired_token_rejected() {
        let svc = service();
        let past = Utc::now().timestamp() - 120;
        let issued = svc.issue("user-1", None, Some(past)).unwrap();

        let err = svc.verify(&issued.token).unwrap_err();
        match err {
            StampgateError::InvalidToken(reason) => assert!(reason.contains("expired")),
            other => panic!("expected InvalidToken, got {:?}", other),
        }
    }

    #[test]
    fn test_expiry_within_clock_skew_accepted() {
        let svc = service();
        // Expired 2 seconds ago - inside the 5 second tolerance
        let just_past = Utc::now().timestamp() - 2;
        let issued = svc.issue("user-1", None, Some(just_past)).unwrap();

        assert!(svc.verify(&issued.token).is_ok());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let issued = service().issue("user-1", None, None).unwrap();
        let other = TokenService::new("different-secret", 60);

        let err = other.verify(&issued.token).unwrap_err();
        match err {
            StampgateError::InvalidToken(reason) => assert!(reason.contains("signature")),
            other => panic!("expected InvalidToken, got {:?}", other),
        }
    }

    #[test]
    fn test_wrong_version_rejected() {
        let svc = service();
        let now = Utc::now().timestamp();
        let claims = QrClaims {
            sub: "user-1".into(),
            iat: now,
            exp: now + 60,
            jti: generate_nonce(),
            ver: 2,
            aud: QR_AUDIENCE.into(),
            iss: QR_ISSUER.into(),
            device_id: None,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();

        let err = svc.verify(&token).unwrap_err();
        match err {
            StampgateError::InvalidToken(reason) => assert!(reason.contains("version")),
            other => panic!("expected InvalidToken, got {:?}", other),
        }
    }

    #[test]
    fn test_wrong_audience_rejected() {
        let svc = service();
        let now = Utc::now().timestamp();
        let claims = QrClaims {
            sub: "user-1".into(),
            iat: now,
            exp: now + 60,
            jti: generate_nonce(),
            ver: QR_TOKEN_VERSION,
            aud: "someone-else/qr".into(),
            iss: QR_ISSUER.into(),
            device_id: None,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();

        let err = svc.verify(&token).unwrap_err();
        match err {
            StampgateError::InvalidToken(reason) => assert!(reason.contains("audience")),
            other => panic!("expected InvalidToken, got {:?}", other),
        }
    }

    #[test]
    fn test_garbage_rejected_as_malformed() {
        let err = service().verify("not-a-jwt").unwrap_err();
        match err {
            StampgateError::InvalidToken(reason) => assert!(reason.contains("malformed")),
            other => panic!("expected InvalidToken, got {:?}", other),
        }
    }
}
