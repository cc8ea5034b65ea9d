//! Document schemas for all Stampgate collections
//!
//! Structs are shared between the MongoDB-backed store and the
//! in-memory store; unique indexes declared here are what make the
//! conditional-creation primitives atomic on MongoDB.

pub mod achievement;
pub mod badge;
pub mod check_in;
pub mod nonce;
pub mod otp;
pub mod progress;
pub mod stamp_card;
pub mod stats;
pub mod user;
pub mod value_event;

pub use achievement::{
    AchievementEventDoc, AchievementSummary, BadgeGrant, XpBreakdown, ACHIEVEMENT_EVENT_COLLECTION,
};
pub use badge::{BadgeDoc, UserBadgeDoc, BADGE_COLLECTION, USER_BADGE_COLLECTION};
pub use check_in::{CheckInDoc, CHECK_IN_COLLECTION};
pub use nonce::{ConsumedNonceDoc, CONSUMED_NONCE_COLLECTION};
pub use otp::{OtpDoc, OTP_COLLECTION};
pub use progress::{UserProgressDoc, USER_PROGRESS_COLLECTION};
pub use stamp_card::{StampCardProgressDoc, STAMP_CARD_COLLECTION};
pub use stats::{DailyStatsDoc, DAILY_STATS_COLLECTION};
pub use user::{UserDoc, UserRole, USER_COLLECTION};
pub use value_event::{ValueEventDoc, ValueEventType, VALUE_EVENT_COLLECTION};
