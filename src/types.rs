//! Shared error and result types for Stampgate
//!
//! Error kinds follow the callable-endpoint taxonomy: client input
//! errors, authorization errors, state conflicts, and transient
//! infrastructure errors each map to a distinct HTTP status and a
//! stable machine-readable code.

use hyper::StatusCode;
use thiserror::Error;

/// Top-level error type for all Stampgate operations
#[derive(Debug, Error)]
pub enum StampgateError {
    /// Missing or malformed request parameters
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Caller is not authenticated
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// Caller lacks the role required for the operation
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Referenced entity does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Structural, signature, audience/issuer, version, or expiry
    /// failure on a presented token. The message carries the specific
    /// reason for observability; it never contains key material.
    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// Strict single-use contract violated (replayed nonce)
    #[error("already used: {0}")]
    AlreadyUsed(String),

    /// Authentication subsystem failure (hashing, token signing)
    #[error("auth error: {0}")]
    Auth(String),

    /// Storage layer failure - safe to retry, all effectful
    /// operations are guarded by idempotency markers
    #[error("database error: {0}")]
    Database(String),

    /// HTTP transport failure
    #[error("http error: {0}")]
    Http(String),

    /// Anything else - surfaced to the caller as internal
    #[error("internal error: {0}")]
    Internal(String),
}

impl StampgateError {
    /// HTTP status for the client-facing response
    pub fn status_code(&self) -> StatusCode {
        match self {
            StampgateError::InvalidArgument(_) | StampgateError::InvalidToken(_) => {
                StatusCode::BAD_REQUEST
            }
            StampgateError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            StampgateError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            StampgateError::NotFound(_) => StatusCode::NOT_FOUND,
            StampgateError::AlreadyUsed(_) => StatusCode::CONFLICT,
            StampgateError::Auth(_)
            | StampgateError::Database(_)
            | StampgateError::Http(_)
            | StampgateError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code included in error responses
    pub fn code(&self) -> &'static str {
        match self {
            StampgateError::InvalidArgument(_) => "INVALID_ARGUMENT",
            StampgateError::Unauthenticated(_) => "UNAUTHENTICATED",
            StampgateError::PermissionDenied(_) => "PERMISSION_DENIED",
            StampgateError::NotFound(_) => "NOT_FOUND",
            StampgateError::InvalidToken(_) => "INVALID_TOKEN",
            StampgateError::AlreadyUsed(_) => "ALREADY_USED",
            StampgateError::Auth(_) => "AUTH_ERROR",
            StampgateError::Database(_) => "DB_ERROR",
            StampgateError::Http(_) => "HTTP_ERROR",
            StampgateError::Internal(_) => "INTERNAL",
        }
    }
}

impl From<std::io::Error> for StampgateError {
    fn from(e: std::io::Error) -> Self {
        StampgateError::Internal(format!("I/O error: {}", e))
    }
}

impl From<hyper::Error> for StampgateError {
    fn from(e: hyper::Error) -> Self {
        StampgateError::Http(e.to_string())
    }
}

/// Convenience result alias used throughout the crate
pub type Result<T> = std::result::Result<T, StampgateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            StampgateError::AlreadyUsed("jti".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            StampgateError::Unauthenticated("no token".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            StampgateError::Database("down".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(StampgateError::InvalidToken("x".into()).code(), "INVALID_TOKEN");
        assert_eq!(StampgateError::AlreadyUsed("x".into()).code(), "ALREADY_USED");
    }
}
