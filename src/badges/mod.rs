//! Badge evaluation
//!
//! Runs after every applied value event. Each active badge's condition
//! is parsed and checked against the user's counters; satisfied rules
//! grant the badge once and are reported with an `alreadyOwned` flag
//! either way.

pub mod rules;

use std::sync::Arc;

use chrono::{FixedOffset, Utc};
use tracing::debug;

use crate::db::schemas::{BadgeGrant, UserBadgeDoc};
use crate::ledger::levels::level_from_total_experience;
use crate::store::{LoyaltyStore, StampEventFilter};
use crate::types::Result;

pub use rules::{ParsedRule, Period};

pub struct BadgeEvaluator {
    store: Arc<dyn LoyaltyStore>,
    tz: FixedOffset,
}

impl BadgeEvaluator {
    pub fn new(store: Arc<dyn LoyaltyStore>, tz: FixedOffset) -> Self {
        Self { store, tz }
    }

    /// Evaluate every active badge for one user after a value event at
    /// `store_id`. Returns satisfied badges sorted by display order.
    pub async fn evaluate(&self, user_id: &str, store_id: &str) -> Result<Vec<BadgeGrant>> {
        let badges = self.store.active_badges().await?;
        if badges.is_empty() {
            return Ok(Vec::new());
        }

        // Counters are read once, before any grant in this pass, so a
        // badge_count rule sees the pre-event state consistently.
        let owned_before = self.store.owned_badge_count(user_id).await?;
        let level = self
            .store
            .user_progress(user_id)
            .await?
            .map(|p| p.level)
            .unwrap_or_else(|| level_from_total_experience(0));

        let now = Utc::now();
        let mut grants = Vec::new();

        for badge in badges {
            let rule = ParsedRule::parse(&badge.condition);
            let satisfied = match &rule {
                ParsedRule::Skip => {
                    debug!(badge_id = %badge.badge_id, "skipping unrecognized badge condition");
                    false
                }
                ParsedRule::UserLevel { threshold } => level >= *threshold,
                ParsedRule::BadgeCount { threshold } => owned_before >= *threshold,
                ParsedRule::FirstCheckin => {
                    self.count(user_id, StampEventFilter::default()).await? >= 1
                }
                ParsedRule::CheckinsCount { threshold, period } => {
                    let filter = StampEventFilter {
                        since: self.period_since(*period, now),
                        ..Default::default()
                    };
                    self.count(user_id, filter).await? >= *threshold
                }
                ParsedRule::DayOfWeekCount {
                    weekday,
                    threshold,
                    period,
                } => {
                    let filter = StampEventFilter {
                        since: self.period_since(*period, now),
                        weekday: Some(*weekday),
                        ..Default::default()
                    };
                    self.count(user_id, filter).await? >= *threshold
                }
                ParsedRule::UsageCount { threshold, period } => {
                    let filter = StampEventFilter {
                        since: self.period_since(*period, now),
                        ..Default::default()
                    };
                    self.count(user_id, filter).await? >= *threshold
                }
                ParsedRule::VisitFrequency { threshold, period } => {
                    let filter = StampEventFilter {
                        since: self.period_since(*period, now),
                        store_id: Some(store_id.to_string()),
                        ..Default::default()
                    };
                    self.count(user_id, filter).await? >= *threshold
                }
            };

            if !satisfied {
                continue;
            }

            let granted_now = self
                .store
                .grant_badge_if_absent(UserBadgeDoc::from_badge(user_id, &badge))
                .await?;
            grants.push(BadgeGrant {
                badge_id: badge.badge_id.clone(),
                name: badge.name.clone(),
                icon_url: badge.icon_url.clone(),
                display_order: badge.display_order,
                already_owned: !granted_now,
            });
        }

        grants.sort_by_key(|g| g.display_order);
        Ok(grants)
    }

    fn period_since(&self, period: Period, now: chrono::DateTime<Utc>) -> Option<bson::DateTime> {
        period
            .start(now, self.tz)
            .map(bson::DateTime::from_chrono)
    }

    async fn count(&self, user_id: &str, filter: StampEventFilter) -> Result<u64> {
        self.store.count_stamp_events(user_id, &filter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    use crate::db::schemas::{BadgeDoc, ValueEventDoc, ValueEventType};
    use crate::store::memory::MemoryStore;

    fn badge(badge_id: &str, order: i64, condition: bson::Document) -> BadgeDoc {
        BadgeDoc {
            badge_id: badge_id.to_string(),
            name: badge_id.to_string(),
            description: None,
            icon_url: None,
            display_order: order,
            is_active: true,
            condition: bson::Bson::Document(condition),
        }
    }

    async fn punch(store: &MemoryStore, user_id: &str, txn: &str, store_id: &str) {
        store
            .create_value_event(ValueEventDoc {
                transaction_id: txn.to_string(),
                user_id: user_id.to_string(),
                store_id: store_id.to_string(),
                store_name: String::new(),
                event_type: ValueEventType::StampPunch,
                points: 10,
                weekday: 3,
                processed: false,
                summary: None,
                created_at: bson::DateTime::now(),
            })
            .await
            .unwrap();
    }

    fn evaluator(store: Arc<MemoryStore>) -> BadgeEvaluator {
        BadgeEvaluator::new(store, FixedOffset::east_opt(9 * 3600).unwrap())
    }

    #[tokio::test]
    async fn test_first_checkin_granted_once() {
        let store = MemoryStore::shared();
        store
            .add_badge(badge(
                "first-visit",
                1,
                doc! { "mode": "typed", "rule": { "type": "first_checkin" } },
            ))
            .await;
        punch(&store, "user-1", "txn-1", "store-1").await;

        let eval = evaluator(Arc::clone(&store));
        let grants = eval.evaluate("user-1", "store-1").await.unwrap();
        assert_eq!(grants.len(), 1);
        assert!(!grants[0].already_owned);

        // Still satisfied on the next visit but already owned
        punch(&store, "user-1", "txn-2", "store-1").await;
        let grants = eval.evaluate("user-1", "store-1").await.unwrap();
        assert_eq!(grants.len(), 1);
        assert!(grants[0].already_owned);
    }

    #[tokio::test]
    async fn test_badge_count_reads_pre_pass_state() {
        let store = MemoryStore::shared();
        store
            .add_badge(badge(
                "starter",
                1,
                doc! { "mode": "typed", "rule": { "type": "first_checkin" } },
            ))
            .await;
        store
            .add_badge(badge(
                "collector",
                2,
                doc! { "mode": "typed", "rule": {
                    "type": "badge_count",
                    "params": { "threshold": 1i64 },
                }},
            ))
            .await;
        punch(&store, "user-1", "txn-1", "store-1").await;

        let eval = evaluator(Arc::clone(&store));
        // First pass grants "starter" only; "collector" sees zero
        // owned badges because counts were read before any grant
        let grants = eval.evaluate("user-1", "store-1").await.unwrap();
        assert_eq!(grants.len(), 1);
        assert_eq!(grants[0].badge_id, "starter");

        let grants = eval.evaluate("user-1", "store-1").await.unwrap();
        let ids: Vec<&str> = grants.iter().map(|g| g.badge_id.as_str()).collect();
        assert_eq!(ids, vec!["starter", "collector"]);
    }

    #[tokio::test]
    async fn test_visit_frequency_scoped_to_store() {
        let store = MemoryStore::shared();
        store
            .add_badge(badge(
                "regular",
                1,
                doc! { "mode": "typed", "rule": {
                    "type": "visit_frequency",
                    "params": { "threshold": 2i64, "period": "unlimited" },
                }},
            ))
            .await;
        punch(&store, "user-1", "txn-1", "store-a").await;
        punch(&store, "user-1", "txn-2", "store-b").await;
        punch(&store, "user-1", "txn-3", "store-a").await;

        let eval = evaluator(Arc::clone(&store));
        // Two visits at store-a satisfy it there but not at store-b
        assert!(eval.evaluate("user-1", "store-b").await.unwrap().is_empty());
        assert_eq!(eval.evaluate("user-1", "store-a").await.unwrap().len(), 1);
    }

    async fn set_level(store: &MemoryStore, user_id: &str, txn: &str, level: u32) {
        use crate::db::schemas::AchievementSummary;
        use crate::store::EventDecision;

        punch(store, user_id, txn, "store-1").await;
        store
            .apply_value_event(user_id, "store-1", txn, &move |_| EventDecision::Apply {
                summary: AchievementSummary::zeroed(),
                stamps_after: 0,
                experience_after: 0,
                level_after: level,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_user_level_threshold_grants_once() {
        let store = MemoryStore::shared();
        store
            .add_badge(badge(
                "veteran",
                1,
                doc! { "mode": "typed", "rule": {
                    "type": "user_level",
                    "params": { "threshold": 5i64 },
                }},
            ))
            .await;

        let eval = evaluator(Arc::clone(&store));

        // Level 4 does not satisfy a threshold of 5
        set_level(&store, "user-1", "txn-1", 4).await;
        assert!(eval.evaluate("user-1", "store-1").await.unwrap().is_empty());

        set_level(&store, "user-1", "txn-2", 5).await;
        let grants = eval.evaluate("user-1", "store-1").await.unwrap();
        assert_eq!(grants.len(), 1);
        assert_eq!(grants[0].badge_id, "veteran");
        assert!(!grants[0].already_owned);

        // Still satisfied on the next pass but granted only once
        let grants = eval.evaluate("user-1", "store-1").await.unwrap();
        assert_eq!(grants.len(), 1);
        assert!(grants[0].already_owned);
    }

    #[tokio::test]
    async fn test_grants_sorted_by_display_order() {
        let store = MemoryStore::shared();
        store
            .add_badge(badge(
                "second",
                5,
                doc! { "mode": "typed", "rule": { "type": "first_checkin" } },
            ))
            .await;
        store
            .add_badge(badge(
                "first",
                1,
                doc! { "mode": "typed", "rule": { "type": "first_checkin" } },
            ))
            .await;
        punch(&store, "user-1", "txn-1", "store-1").await;

        let eval = evaluator(Arc::clone(&store));
        let grants = eval.evaluate("user-1", "store-1").await.unwrap();
        let ids: Vec<&str> = grants.iter().map(|g| g.badge_id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second"]);
    }
}
