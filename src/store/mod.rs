//! Storage abstraction for the loyalty core
//!
//! The core needs a keyed-document store with two atomic primitives:
//! conditional creation (create-if-absent, the idempotency guard for
//! nonces, badges, and achievement records) and a transactional
//! read-then-write over the handful of records one value event
//! touches. `LoyaltyStore` expresses exactly that contract.
//!
//! Two implementations, mirroring the memory-only vs MongoDB-backed
//! split used for projection storage in the gateway this service grew
//! out of: `MemoryStore` (dev mode, unit tests) and `MongoStore`
//! (production).

pub mod memory;
pub mod mongo_store;

pub use memory::MemoryStore;
pub use mongo_store::MongoStore;

use async_trait::async_trait;
use bson::DateTime;

use crate::db::schemas::{
    AchievementEventDoc, AchievementSummary, BadgeDoc, CheckInDoc, OtpDoc, StampCardProgressDoc,
    UserBadgeDoc, UserDoc, UserProgressDoc, ValueEventDoc,
};
use crate::qr::NonceContext;
use crate::types::Result;

/// State read inside the achievement transaction, before any write
#[derive(Debug, Clone)]
pub struct EventSnapshot {
    /// Processed marker on the value-event record itself
    pub already_processed: bool,
    /// Summary stored by a prior completed attempt, if any
    pub stored_summary: Option<AchievementSummary>,
    /// Current stamp count for (user, store); 0 when no card exists
    pub stamps: i32,
    /// Current total experience; 0 when no progress record exists
    pub experience: i64,
}

/// Outcome of the ledger's decision function for one value event
#[derive(Debug, Clone)]
pub enum EventDecision {
    /// No writes; return this summary (idempotent replay)
    Skip(AchievementSummary),
    /// Write the new state and the processed marker atomically
    Apply {
        summary: AchievementSummary,
        stamps_after: i32,
        experience_after: i64,
        level_after: u32,
    },
}

/// Result of `apply_value_event`
#[derive(Debug, Clone)]
pub struct AppliedEvent {
    pub summary: AchievementSummary,
    /// False when an idempotency marker short-circuited the write
    pub applied: bool,
}

/// Pure decision function: snapshot in, decision out. The store runs
/// it inside its transaction so no other writer interleaves between
/// the read and the write.
pub type DecideFn<'a> = &'a (dyn Fn(EventSnapshot) -> EventDecision + Send + Sync);

/// Filter for stamp-event counting queries used by badge rules
#[derive(Debug, Clone, Default)]
pub struct StampEventFilter {
    /// Only events at or after this instant (None = all-time)
    pub since: Option<DateTime>,
    /// Only events on this weekday (0 = Sunday .. 6 = Saturday)
    pub weekday: Option<i32>,
    /// Only events at this store
    pub store_id: Option<String>,
}

/// Transactional keyed-document store contract for the loyalty core
#[async_trait]
pub trait LoyaltyStore: Send + Sync {
    // ---- token replay guard ----

    /// Atomically create the consumed-nonce record for `jti`.
    ///
    /// Fails with `AlreadyUsed` and performs no writes when a record
    /// already exists. The existence check and the creation are one
    /// atomic unit; two concurrent calls for the same jti cannot both
    /// succeed.
    async fn consume_nonce(&self, jti: &str, ctx: NonceContext) -> Result<()>;

    // ---- value events ----

    /// Create the originating transaction document if absent.
    /// Returns false (with no writes) when the id is already taken -
    /// at-least-once delivery makes duplicate creation attempts
    /// ordinary.
    async fn create_value_event(&self, event: ValueEventDoc) -> Result<bool>;

    /// Run the achievement transaction for one value event: read the
    /// processed marker, stamp card, and user progress; call `decide`;
    /// apply its writes atomically.
    ///
    /// Fails with `NotFound` when no value event exists for
    /// `transaction_id`.
    async fn apply_value_event(
        &self,
        user_id: &str,
        store_id: &str,
        transaction_id: &str,
        decide: DecideFn<'_>,
    ) -> Result<AppliedEvent>;

    /// Oldest unprocessed value events, for the dispatcher task
    async fn pending_value_events(&self, limit: usize) -> Result<Vec<ValueEventDoc>>;

    /// Count stamp-punch events for a user matching `filter`
    async fn count_stamp_events(&self, user_id: &str, filter: &StampEventFilter) -> Result<u64>;

    // ---- achievement event records ----

    async fn achievement_event(
        &self,
        user_id: &str,
        transaction_id: &str,
    ) -> Result<Option<AchievementEventDoc>>;

    /// Create the achievement event record if absent. Concurrent
    /// duplicates merge: the first writer's summary wins (both would
    /// compute identical values) and the seen field is never touched.
    async fn put_achievement_event(&self, doc: AchievementEventDoc) -> Result<()>;

    async fn unseen_achievement_events(&self, user_id: &str) -> Result<Vec<AchievementEventDoc>>;

    /// Set the seen timestamp; only moves from null to non-null.
    /// Returns false when no matching unseen record exists.
    async fn mark_achievement_seen(&self, user_id: &str, transaction_id: &str) -> Result<bool>;

    // ---- progress reads ----

    async fn stamp_progress(
        &self,
        user_id: &str,
        store_id: &str,
    ) -> Result<Option<StampCardProgressDoc>>;

    async fn user_progress(&self, user_id: &str) -> Result<Option<UserProgressDoc>>;

    // ---- badges ----

    /// All active badge configurations (re-read every evaluation,
    /// no caching - this is a low-QPS path and operators edit badges
    /// independently)
    async fn active_badges(&self) -> Result<Vec<BadgeDoc>>;

    async fn owned_badge_count(&self, user_id: &str) -> Result<u64>;

    /// Conditionally create the ownership record. Returns true when
    /// newly created, false when the badge was already owned.
    async fn grant_badge_if_absent(&self, grant: UserBadgeDoc) -> Result<bool>;

    // ---- check-ins and stats ----

    async fn record_check_in(&self, doc: CheckInDoc) -> Result<()>;

    /// Merge one check-in into the daily stats document for `date`
    async fn merge_daily_stats(&self, date: &str, user_id: &str) -> Result<()>;

    // ---- users and OTP ----

    async fn find_user(&self, identifier: &str) -> Result<Option<UserDoc>>;

    /// Create the user if the identifier is free. Returns false when
    /// it is already taken.
    async fn create_user(&self, user: UserDoc) -> Result<bool>;

    async fn mark_user_verified(&self, identifier: &str) -> Result<()>;

    /// Store a pending OTP, replacing any previous code for the
    /// identifier
    async fn put_otp(&self, otp: OtpDoc) -> Result<()>;

    /// Remove and return the pending OTP for `identifier`
    async fn take_otp(&self, identifier: &str) -> Result<Option<OtpDoc>>;
}
