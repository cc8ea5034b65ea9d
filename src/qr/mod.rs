//! QR check-in token service
//!
//! Issues signed, time-boxed, single-use credentials binding a user
//! to a redemption window. A store terminal presents the credential
//! for verification; replay is prevented by a one-time-use nonce
//! record consumed atomically in the store.

pub mod token;

pub use token::{IssuedToken, NonceContext, QrClaims, TokenService};
