//! Achievement ledger
//!
//! Converts value events (point awards, stamp punches) into stamp-card
//! progress, experience, levels, and badge grants. Delivery is
//! at-least-once, so every effect sits behind an idempotency marker:
//! the durable achievement record guards whole-call replays and the
//! processed flag on the transaction record guards replays that died
//! between commit and record write.

pub mod levels;

use std::sync::Arc;

use bson::DateTime;
use tracing::{info, warn};

use crate::badges::BadgeEvaluator;
use crate::db::schemas::{AchievementEventDoc, AchievementSummary, ValueEventDoc, XpBreakdown};
use crate::ledger::levels::{experience_cap, level_from_total_experience};
use crate::store::{EventDecision, EventSnapshot, LoyaltyStore};
use crate::types::Result;

/// Stamps needed to complete a card
pub const MAX_STAMPS: i32 = 10;

/// Experience granted per stamp added
pub const STAMP_XP: i64 = 10;

/// Experience bonus for completing a card
pub const CARD_COMPLETE_XP: i64 = 100;

pub struct AchievementLedger {
    store: Arc<dyn LoyaltyStore>,
    evaluator: BadgeEvaluator,
}

impl AchievementLedger {
    pub fn new(store: Arc<dyn LoyaltyStore>, evaluator: BadgeEvaluator) -> Self {
        Self { store, evaluator }
    }

    /// Process one value event into its achievement summary.
    ///
    /// Safe to call any number of times for the same event: replays
    /// return the stored summary without re-applying effects. A
    /// failure after the core transaction committed (badge evaluation
    /// or the record write) leaves the call retryable; the retry
    /// short-circuits the core and completes the remainder.
    pub async fn process(&self, event: &ValueEventDoc) -> Result<AchievementSummary> {
        if let Some(record) = self
            .store
            .achievement_event(&event.user_id, &event.transaction_id)
            .await?
        {
            return Ok(record.summary);
        }

        let points_awarded = event.points;
        let decide = move |snapshot: EventSnapshot| {
            if snapshot.already_processed {
                return EventDecision::Skip(
                    snapshot
                        .stored_summary
                        .unwrap_or_else(AchievementSummary::zeroed),
                );
            }

            let stamps_added = i32::from(snapshot.stamps < MAX_STAMPS);
            let stamps_after = snapshot.stamps + stamps_added;
            let card_completed = stamps_added == 1 && stamps_after == MAX_STAMPS;

            let breakdown = XpBreakdown {
                points: points_awarded,
                stamp_punch: STAMP_XP * i64::from(stamps_added),
                card_complete: if card_completed { CARD_COMPLETE_XP } else { 0 },
            };
            // Saturating: caller-supplied point amounts can be
            // arbitrarily large, and the cap clamp below only works
            // on a sum that did not wrap
            let xp_added = breakdown
                .points
                .saturating_add(breakdown.stamp_punch)
                .saturating_add(breakdown.card_complete);

            let experience_after = snapshot
                .experience
                .saturating_add(xp_added)
                .clamp(0, experience_cap());
            let level_after = level_from_total_experience(experience_after);

            EventDecision::Apply {
                summary: AchievementSummary {
                    points_awarded,
                    stamps_added,
                    stamps_after,
                    card_completed,
                    xp_added,
                    xp_breakdown: breakdown,
                    experience_after,
                    level_after,
                    badges: Vec::new(),
                },
                stamps_after,
                experience_after,
                level_after,
            }
        };

        let applied = self
            .store
            .apply_value_event(&event.user_id, &event.store_id, &event.transaction_id, &decide)
            .await?;
        let mut summary = applied.summary;

        if applied.applied {
            info!(
                user_id = %event.user_id,
                transaction_id = %event.transaction_id,
                xp_added = summary.xp_added,
                stamps_after = summary.stamps_after,
                level_after = summary.level_after,
                card_completed = summary.card_completed,
                "value event applied",
            );
        }

        // Badges evaluate outside the transaction and are best-effort:
        // the committed stamp/XP state stands even when evaluation
        // fails, and a badge may be missed but never double-granted.
        summary.badges = match self.evaluator.evaluate(&event.user_id, &event.store_id).await {
            Ok(badges) => badges,
            Err(e) => {
                warn!(
                    user_id = %event.user_id,
                    transaction_id = %event.transaction_id,
                    "badge evaluation failed: {}", e,
                );
                Vec::new()
            }
        };

        self.store
            .put_achievement_event(AchievementEventDoc {
                user_id: event.user_id.clone(),
                transaction_id: event.transaction_id.clone(),
                event_type: event.event_type,
                store_id: event.store_id.clone(),
                store_name: event.store_name.clone(),
                summary: summary.clone(),
                created_at: DateTime::now(),
                seen_at: None,
            })
            .await?;

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    use crate::db::schemas::ValueEventType;
    use crate::store::MemoryStore;

    fn ledger(store: Arc<MemoryStore>) -> AchievementLedger {
        let evaluator = BadgeEvaluator::new(
            Arc::clone(&store) as Arc<dyn LoyaltyStore>,
            FixedOffset::east_opt(9 * 3600).unwrap(),
        );
        AchievementLedger::new(store, evaluator)
    }

    async fn seeded_event(
        store: &MemoryStore,
        txn: &str,
        event_type: ValueEventType,
        points: i64,
    ) -> ValueEventDoc {
        let event = ValueEventDoc {
            transaction_id: txn.to_string(),
            user_id: "user-1".into(),
            store_id: "store-1".into(),
            store_name: "Cafe".into(),
            event_type,
            points,
            weekday: 3,
            processed: false,
            summary: None,
            created_at: DateTime::now(),
        };
        store.create_value_event(event.clone()).await.unwrap();
        event
    }

    #[tokio::test]
    async fn test_stamp_punch_awards_points_stamp_and_xp() {
        let store = MemoryStore::shared();
        let ledger = ledger(Arc::clone(&store));
        let event = seeded_event(&store, "txn-1", ValueEventType::StampPunch, 10).await;

        let summary = ledger.process(&event).await.unwrap();
        assert_eq!(summary.points_awarded, 10);
        assert_eq!(summary.stamps_added, 1);
        assert_eq!(summary.stamps_after, 1);
        assert!(!summary.card_completed);
        assert_eq!(summary.xp_added, 20);
        assert_eq!(summary.experience_after, 20);
        assert_eq!(summary.level_after, 2);

        let card = store.stamp_progress("user-1", "store-1").await.unwrap().unwrap();
        assert_eq!(card.stamps, 1);
    }

    #[tokio::test]
    async fn test_replay_returns_stored_summary_without_effects() {
        let store = MemoryStore::shared();
        let ledger = ledger(Arc::clone(&store));
        let event = seeded_event(&store, "txn-1", ValueEventType::StampPunch, 10).await;

        let first = ledger.process(&event).await.unwrap();
        let second = ledger.process(&event).await.unwrap();
        assert_eq!(first.experience_after, second.experience_after);
        assert_eq!(first.stamps_after, second.stamps_after);

        // Effects were applied exactly once
        let card = store.stamp_progress("user-1", "store-1").await.unwrap().unwrap();
        assert_eq!(card.stamps, 1);
        let progress = store.user_progress("user-1").await.unwrap().unwrap();
        assert_eq!(progress.experience, 20);
    }

    #[tokio::test]
    async fn test_tenth_stamp_completes_card() {
        let store = MemoryStore::shared();
        let ledger = ledger(Arc::clone(&store));

        for i in 0..9 {
            let event =
                seeded_event(&store, &format!("txn-{i}"), ValueEventType::StampPunch, 0).await;
            ledger.process(&event).await.unwrap();
        }

        let event = seeded_event(&store, "txn-9", ValueEventType::StampPunch, 0).await;
        let summary = ledger.process(&event).await.unwrap();
        assert_eq!(summary.stamps_after, MAX_STAMPS);
        assert!(summary.card_completed);
        // 10 stamp XP + 100 completion bonus = 110, 9 * 10 before it
        assert_eq!(summary.xp_added, 110);
        assert_eq!(summary.experience_after, 200);
    }

    #[tokio::test]
    async fn test_completion_bonus_reaches_level_four_from_zero() {
        let store = MemoryStore::shared();
        let ledger = ledger(Arc::clone(&store));

        // Card at 9 stamps but no experience yet
        let seed = seeded_event(&store, "seed", ValueEventType::StampPunch, 0).await;
        store
            .apply_value_event("user-1", "store-1", "seed", &|_| EventDecision::Apply {
                summary: AchievementSummary::zeroed(),
                stamps_after: 9,
                experience_after: 0,
                level_after: 1,
            })
            .await
            .unwrap();
        drop(seed);

        let event = seeded_event(&store, "txn-1", ValueEventType::StampPunch, 0).await;
        let summary = ledger.process(&event).await.unwrap();
        assert_eq!(summary.xp_added, 110);
        assert_eq!(summary.experience_after, 110);
        assert_eq!(summary.level_after, 4);
    }

    #[tokio::test]
    async fn test_full_card_stops_adding_stamps() {
        let store = MemoryStore::shared();
        let ledger = ledger(Arc::clone(&store));

        for i in 0..10 {
            let event =
                seeded_event(&store, &format!("txn-{i}"), ValueEventType::StampPunch, 0).await;
            ledger.process(&event).await.unwrap();
        }

        let event = seeded_event(&store, "txn-extra", ValueEventType::PointAward, 30).await;
        let summary = ledger.process(&event).await.unwrap();
        assert_eq!(summary.stamps_added, 0);
        assert_eq!(summary.stamps_after, MAX_STAMPS);
        assert!(!summary.card_completed);
        // Only the points count toward experience on a full card
        assert_eq!(summary.xp_added, 30);
    }

    #[tokio::test]
    async fn test_maximum_point_award_saturates_to_cap() {
        let store = MemoryStore::shared();
        let ledger = ledger(Arc::clone(&store));
        let event = seeded_event(&store, "txn-1", ValueEventType::PointAward, i64::MAX).await;

        // The stamp XP on top of i64::MAX must not wrap negative
        let summary = ledger.process(&event).await.unwrap();
        assert_eq!(summary.xp_added, i64::MAX);
        assert_eq!(summary.experience_after, experience_cap());
        assert_eq!(summary.level_after, levels::LEVEL_MAX);
    }

    #[tokio::test]
    async fn test_experience_clamped_at_cap() {
        let store = MemoryStore::shared();
        let ledger = ledger(Arc::clone(&store));
        let event =
            seeded_event(&store, "txn-1", ValueEventType::PointAward, i64::MAX / 4).await;

        let summary = ledger.process(&event).await.unwrap();
        assert_eq!(summary.experience_after, experience_cap());
        assert_eq!(summary.level_after, levels::LEVEL_MAX);
    }
}
