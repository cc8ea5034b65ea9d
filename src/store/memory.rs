//! In-memory store
//!
//! A single async mutex over plain maps: holding the lock for the
//! whole read-decide-write sequence is what makes every primitive
//! atomic. Used in dev mode without MongoDB and as the test double
//! for the ledger and badge evaluator.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bson::DateTime;
use tokio::sync::Mutex;

use crate::db::schemas::{
    AchievementEventDoc, BadgeDoc, CheckInDoc, DailyStatsDoc, OtpDoc, StampCardProgressDoc,
    UserBadgeDoc, UserDoc, UserProgressDoc, ValueEventDoc, ValueEventType,
};
use crate::qr::NonceContext;
use crate::store::{
    AppliedEvent, DecideFn, EventDecision, EventSnapshot, LoyaltyStore, StampEventFilter,
};
use crate::types::{Result, StampgateError};

#[derive(Default)]
struct MemoryInner {
    consumed_nonces: HashMap<String, NonceRecord>,
    value_events: HashMap<String, ValueEventDoc>,
    stamp_cards: HashMap<(String, String), StampCardProgressDoc>,
    user_progress: HashMap<String, UserProgressDoc>,
    achievement_events: HashMap<(String, String), AchievementEventDoc>,
    badges: Vec<BadgeDoc>,
    user_badges: HashMap<(String, String), UserBadgeDoc>,
    check_ins: Vec<CheckInDoc>,
    daily_stats: HashMap<String, DailyStatsDoc>,
    users: HashMap<String, UserDoc>,
    otps: HashMap<String, OtpDoc>,
}

struct NonceRecord {
    #[allow(dead_code)]
    used_at: DateTime,
    #[allow(dead_code)]
    ctx: NonceContext,
}

/// Memory-backed `LoyaltyStore`
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Add a badge configuration (dev seeding and tests; production
    /// badges are operator-managed in MongoDB)
    pub async fn add_badge(&self, badge: BadgeDoc) {
        let mut inner = self.inner.lock().await;
        inner.badges.retain(|b| b.badge_id != badge.badge_id);
        inner.badges.push(badge);
    }

    /// Number of recorded check-ins (tests)
    pub async fn check_in_count(&self) -> usize {
        self.inner.lock().await.check_ins.len()
    }

    /// Daily stats snapshot for one date (tests)
    pub async fn daily_stats(&self, date: &str) -> Option<DailyStatsDoc> {
        self.inner.lock().await.daily_stats.get(date).cloned()
    }
}

#[async_trait]
impl LoyaltyStore for MemoryStore {
    async fn consume_nonce(&self, jti: &str, ctx: NonceContext) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.consumed_nonces.contains_key(jti) {
            return Err(StampgateError::AlreadyUsed(format!(
                "nonce {} has already been used",
                jti
            )));
        }
        inner.consumed_nonces.insert(
            jti.to_string(),
            NonceRecord {
                used_at: DateTime::now(),
                ctx,
            },
        );
        Ok(())
    }

    async fn create_value_event(&self, event: ValueEventDoc) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        if inner.value_events.contains_key(&event.transaction_id) {
            return Ok(false);
        }
        inner
            .value_events
            .insert(event.transaction_id.clone(), event);
        Ok(true)
    }

    async fn apply_value_event(
        &self,
        user_id: &str,
        store_id: &str,
        transaction_id: &str,
        decide: DecideFn<'_>,
    ) -> Result<AppliedEvent> {
        let mut inner = self.inner.lock().await;

        let event = inner.value_events.get(transaction_id).ok_or_else(|| {
            StampgateError::NotFound(format!("value event {} not found", transaction_id))
        })?;

        let card_key = (user_id.to_string(), store_id.to_string());
        let snapshot = EventSnapshot {
            already_processed: event.processed,
            stored_summary: event.summary.clone(),
            stamps: inner.stamp_cards.get(&card_key).map(|c| c.stamps).unwrap_or(0),
            experience: inner
                .user_progress
                .get(user_id)
                .map(|p| p.experience)
                .unwrap_or(0),
        };

        match decide(snapshot) {
            EventDecision::Skip(summary) => Ok(AppliedEvent {
                summary,
                applied: false,
            }),
            EventDecision::Apply {
                summary,
                stamps_after,
                experience_after,
                level_after,
            } => {
                let now = DateTime::now();

                inner
                    .stamp_cards
                    .entry(card_key.clone())
                    .and_modify(|c| {
                        c.stamps = stamps_after;
                        c.last_visited_at = now;
                    })
                    .or_insert_with(|| StampCardProgressDoc {
                        user_id: user_id.to_string(),
                        store_id: store_id.to_string(),
                        stamps: stamps_after,
                        last_visited_at: now,
                    });

                inner
                    .user_progress
                    .entry(user_id.to_string())
                    .and_modify(|p| {
                        p.experience = experience_after;
                        p.level = level_after;
                        p.updated_at = now;
                    })
                    .or_insert_with(|| UserProgressDoc {
                        user_id: user_id.to_string(),
                        experience: experience_after,
                        level: level_after,
                        updated_at: now,
                    });

                if let Some(event) = inner.value_events.get_mut(transaction_id) {
                    event.processed = true;
                    event.summary = Some(summary.clone());
                }

                Ok(AppliedEvent {
                    summary,
                    applied: true,
                })
            }
        }
    }

    async fn pending_value_events(&self, limit: usize) -> Result<Vec<ValueEventDoc>> {
        let inner = self.inner.lock().await;
        let mut pending: Vec<ValueEventDoc> = inner
            .value_events
            .values()
            .filter(|e| !e.processed)
            .cloned()
            .collect();
        pending.sort_by_key(|e| e.created_at);
        pending.truncate(limit);
        Ok(pending)
    }

    async fn count_stamp_events(&self, user_id: &str, filter: &StampEventFilter) -> Result<u64> {
        let inner = self.inner.lock().await;
        let count = inner
            .value_events
            .values()
            .filter(|e| e.user_id == user_id && e.event_type == ValueEventType::StampPunch)
            .filter(|e| filter.since.map_or(true, |since| e.created_at >= since))
            .filter(|e| filter.weekday.map_or(true, |wd| e.weekday == wd))
            .filter(|e| {
                filter
                    .store_id
                    .as_deref()
                    .map_or(true, |sid| e.store_id == sid)
            })
            .count();
        Ok(count as u64)
    }

    async fn achievement_event(
        &self,
        user_id: &str,
        transaction_id: &str,
    ) -> Result<Option<AchievementEventDoc>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .achievement_events
            .get(&(user_id.to_string(), transaction_id.to_string()))
            .cloned())
    }

    async fn put_achievement_event(&self, doc: AchievementEventDoc) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let key = (doc.user_id.clone(), doc.transaction_id.clone());
        // First writer wins; the seen field is owned by the client
        // acknowledgment path
        inner.achievement_events.entry(key).or_insert(doc);
        Ok(())
    }

    async fn unseen_achievement_events(&self, user_id: &str) -> Result<Vec<AchievementEventDoc>> {
        let inner = self.inner.lock().await;
        let mut events: Vec<AchievementEventDoc> = inner
            .achievement_events
            .values()
            .filter(|e| e.user_id == user_id && e.seen_at.is_none())
            .cloned()
            .collect();
        events.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(events)
    }

    async fn mark_achievement_seen(&self, user_id: &str, transaction_id: &str) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        let key = (user_id.to_string(), transaction_id.to_string());
        match inner.achievement_events.get_mut(&key) {
            Some(event) if event.seen_at.is_none() => {
                event.seen_at = Some(DateTime::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn stamp_progress(
        &self,
        user_id: &str,
        store_id: &str,
    ) -> Result<Option<StampCardProgressDoc>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .stamp_cards
            .get(&(user_id.to_string(), store_id.to_string()))
            .cloned())
    }

    async fn user_progress(&self, user_id: &str) -> Result<Option<UserProgressDoc>> {
        let inner = self.inner.lock().await;
        Ok(inner.user_progress.get(user_id).cloned())
    }

    async fn active_badges(&self) -> Result<Vec<BadgeDoc>> {
        let inner = self.inner.lock().await;
        Ok(inner.badges.iter().filter(|b| b.is_active).cloned().collect())
    }

    async fn owned_badge_count(&self, user_id: &str) -> Result<u64> {
        let inner = self.inner.lock().await;
        Ok(inner
            .user_badges
            .keys()
            .filter(|(uid, _)| uid == user_id)
            .count() as u64)
    }

    async fn grant_badge_if_absent(&self, grant: UserBadgeDoc) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        let key = (grant.user_id.clone(), grant.badge_id.clone());
        if inner.user_badges.contains_key(&key) {
            return Ok(false);
        }
        inner.user_badges.insert(key, grant);
        Ok(true)
    }

    async fn record_check_in(&self, doc: CheckInDoc) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.check_ins.push(doc);
        Ok(())
    }

    async fn merge_daily_stats(&self, date: &str, user_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let entry = inner
            .daily_stats
            .entry(date.to_string())
            .or_insert_with(|| DailyStatsDoc {
                date: date.to_string(),
                total_check_ins: 0,
                unique_users: Vec::new(),
                last_updated: DateTime::now(),
            });
        entry.total_check_ins += 1;
        if !entry.unique_users.iter().any(|u| u == user_id) {
            entry.unique_users.push(user_id.to_string());
        }
        entry.last_updated = DateTime::now();
        Ok(())
    }

    async fn find_user(&self, identifier: &str) -> Result<Option<UserDoc>> {
        let inner = self.inner.lock().await;
        Ok(inner.users.get(identifier).cloned())
    }

    async fn create_user(&self, user: UserDoc) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        if inner.users.contains_key(&user.identifier) {
            return Ok(false);
        }
        inner.users.insert(user.identifier.clone(), user);
        Ok(true)
    }

    async fn mark_user_verified(&self, identifier: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if let Some(user) = inner.users.get_mut(identifier) {
            user.email_verified = true;
        }
        Ok(())
    }

    async fn put_otp(&self, otp: OtpDoc) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.otps.insert(otp.identifier.clone(), otp);
        Ok(())
    }

    async fn take_otp(&self, identifier: &str) -> Result<Option<OtpDoc>> {
        let mut inner = self.inner.lock().await;
        Ok(inner.otps.remove(identifier))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> NonceContext {
        NonceContext {
            store_id: "store-1".into(),
            subject: "user-1".into(),
            device_id: None,
        }
    }

    #[tokio::test]
    async fn test_consume_nonce_once() {
        let store = MemoryStore::new();
        assert!(store.consume_nonce("abc", ctx()).await.is_ok());

        let err = store.consume_nonce("abc", ctx()).await.unwrap_err();
        assert!(matches!(err, StampgateError::AlreadyUsed(_)));
    }

    #[tokio::test]
    async fn test_concurrent_consume_exactly_one_wins() {
        let store = MemoryStore::shared();

        let a = tokio::spawn({
            let store = Arc::clone(&store);
            async move { store.consume_nonce("race-jti", ctx()).await }
        });
        let b = tokio::spawn({
            let store = Arc::clone(&store);
            async move { store.consume_nonce("race-jti", ctx()).await }
        });

        let (ra, rb) = (a.await.unwrap(), b.await.unwrap());
        let successes = [&ra, &rb].iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1, "exactly one concurrent consume must win");
    }

    #[tokio::test]
    async fn test_create_value_event_is_conditional() {
        let store = MemoryStore::new();
        let event = ValueEventDoc {
            transaction_id: "txn-1".into(),
            user_id: "user-1".into(),
            store_id: "store-1".into(),
            store_name: "Cafe".into(),
            event_type: ValueEventType::StampPunch,
            points: 10,
            weekday: 3,
            processed: false,
            summary: None,
            created_at: DateTime::now(),
        };

        assert!(store.create_value_event(event.clone()).await.unwrap());
        assert!(!store.create_value_event(event).await.unwrap());
    }

    #[tokio::test]
    async fn test_grant_badge_if_absent() {
        let store = MemoryStore::new();
        let grant = UserBadgeDoc {
            user_id: "user-1".into(),
            badge_id: "badge-1".into(),
            name: "First Visit".into(),
            icon_url: None,
            display_order: 0,
            granted_at: DateTime::now(),
        };

        assert!(store.grant_badge_if_absent(grant.clone()).await.unwrap());
        assert!(!store.grant_badge_if_absent(grant).await.unwrap());
        assert_eq!(store.owned_badge_count("user-1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_mark_seen_only_moves_from_null() {
        let store = MemoryStore::new();
        store
            .put_achievement_event(AchievementEventDoc {
                user_id: "user-1".into(),
                transaction_id: "txn-1".into(),
                event_type: ValueEventType::StampPunch,
                store_id: "store-1".into(),
                store_name: String::new(),
                summary: crate::db::schemas::AchievementSummary::zeroed(),
                created_at: DateTime::now(),
                seen_at: None,
            })
            .await
            .unwrap();

        assert_eq!(store.unseen_achievement_events("user-1").await.unwrap().len(), 1);
        assert!(store.mark_achievement_seen("user-1", "txn-1").await.unwrap());
        // Second acknowledgment is a no-op
        assert!(!store.mark_achievement_seen("user-1", "txn-1").await.unwrap());
        assert!(store.unseen_achievement_events("user-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_daily_stats_merge() {
        let store = MemoryStore::new();
        store.merge_daily_stats("2026-08-29", "user-1").await.unwrap();
        store.merge_daily_stats("2026-08-29", "user-1").await.unwrap();
        store.merge_daily_stats("2026-08-29", "user-2").await.unwrap();

        let stats = store.daily_stats("2026-08-29").await.unwrap();
        assert_eq!(stats.total_check_ins, 3);
        assert_eq!(stats.unique_users.len(), 2);
    }
}
