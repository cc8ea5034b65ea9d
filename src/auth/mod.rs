//! Authentication for the loyalty gateway
//!
//! Provides:
//! - Session JWT generation and validation for app users and store
//!   operators
//! - Password hashing with Argon2

pub mod jwt;
pub mod password;

pub use jwt::{extract_token_from_header, JwtValidator, SessionClaims, TokenValidationResult};
pub use password::{hash_password, verify_password};
