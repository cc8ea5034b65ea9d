//! Session JWT generation and validation
//!
//! Session tokens identify a logged-in account (app user or store
//! operator) against the HTTP surface. They are distinct from QR
//! check-in tokens, which carry their own audience/issuer pair and a
//! single-use nonce (see `crate::qr`).

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::db::schemas::UserRole;
use crate::types::{Result, StampgateError};

/// Secret used when running in dev mode without a configured secret
const DEV_SECRET: &str = "dev-only-insecure-secret";

/// Claims carried by a session token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Account identifier
    pub sub: String,
    pub role: UserRole,
    pub iat: i64,
    pub exp: i64,
}

/// Result of verifying a session token
#[derive(Debug, Clone)]
pub struct TokenValidationResult {
    pub valid: bool,
    pub claims: Option<SessionClaims>,
    pub error: Option<String>,
}

pub struct JwtValidator {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiry_seconds: i64,
}

impl JwtValidator {
    pub fn new(secret: &str, expiry_seconds: i64) -> Result<Self> {
        if secret.len() < 16 {
            return Err(StampgateError::Auth(
                "JWT secret must be at least 16 characters".to_string(),
            ));
        }
        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expiry_seconds,
        })
    }

    /// Dev-mode validator with a fixed insecure secret
    pub fn new_dev() -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(DEV_SECRET.as_bytes()),
            decoding_key: DecodingKey::from_secret(DEV_SECRET.as_bytes()),
            expiry_seconds: 3600,
        }
    }

    pub fn generate_token(&self, identifier: &str, role: UserRole) -> Result<String> {
        let now = chrono::Utc::now().timestamp();
        let claims = SessionClaims {
            sub: identifier.to_string(),
            role,
            iat: now,
            exp: now + self.expiry_seconds,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| StampgateError::Auth(format!("Failed to generate token: {e}")))
    }

    pub fn verify_token(&self, token: &str) -> TokenValidationResult {
        let validation = Validation::new(Algorithm::HS256);
        match decode::<SessionClaims>(token, &self.decoding_key, &validation) {
            Ok(data) => TokenValidationResult {
                valid: true,
                claims: Some(data.claims),
                error: None,
            },
            Err(e) => TokenValidationResult {
                valid: false,
                claims: None,
                error: Some(e.to_string()),
            },
        }
    }
}

/// Extract the bearer token from an Authorization header value
pub fn extract_token_from_header(header: Option<&str>) -> Option<&str> {
    header?.strip_prefix("Bearer ").map(str::trim)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_and_verify() {
        let jwt = JwtValidator::new("a-sufficiently-long-secret", 3600).unwrap();
        let token = jwt.generate_token("user@example.com", UserRole::User).unwrap();

        let result = jwt.verify_token(&token);
        assert!(result.valid);
        let claims = result.claims.unwrap();
        assert_eq!(claims.sub, "user@example.com");
        assert_eq!(claims.role, UserRole::User);
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let a = JwtValidator::new("secret-number-one-here", 3600).unwrap();
        let b = JwtValidator::new("secret-number-two-here", 3600).unwrap();

        let token = a.generate_token("user@example.com", UserRole::Store).unwrap();
        let result = b.verify_token(&token);
        assert!(!result.valid);
        assert!(result.error.is_some());
    }

    #[test]
    fn test_short_secret_rejected() {
        assert!(JwtValidator::new("short", 3600).is_err());
    }

    #[test]
    fn test_extract_token_from_header() {
        assert_eq!(
            extract_token_from_header(Some("Bearer abc.def.ghi")),
            Some("abc.def.ghi")
        );
        assert_eq!(extract_token_from_header(Some("Basic dXNlcg==")), None);
        assert_eq!(extract_token_from_header(None), None);
    }
}
