//! Stampgate - loyalty backend for QR store check-ins
//!
//! A mobile-app backend gamifying repeat store visits:
//!
//! - **QR tokens**: short-lived, single-use signed credentials a user
//!   presents at the register; replay is blocked by an atomically
//!   consumed nonce
//! - **Achievement ledger**: idempotent conversion of point-award and
//!   stamp-punch events into stamp-card progress, experience, levels,
//!   and badge grants
//! - **Badges**: operator-configured rules over a user's visit history
//! - **Accounts**: argon2 passwords, session JWTs, email OTP
//!   verification

pub mod auth;
pub mod badges;
pub mod config;
pub mod db;
pub mod ledger;
pub mod notify;
pub mod otp;
pub mod qr;
pub mod routes;
pub mod server;
pub mod store;
pub mod types;
pub mod worker;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{Result, StampgateError};
