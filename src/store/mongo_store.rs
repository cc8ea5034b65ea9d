//! MongoDB store
//!
//! Conditional creation rides on unique indexes: an insert that hits a
//! duplicate key IS the "already exists" answer, no read needed.
//! Multi-document updates in `apply_value_event` run inside a session
//! transaction so stamp card, progress and the event itself move
//! together or not at all.

use async_trait::async_trait;
use bson::{doc, DateTime};
use futures_util::TryStreamExt;
use tracing::warn;

use crate::db::mongo::{is_duplicate_key_error, MongoClient, MongoCollection};
use crate::db::schemas::{
    AchievementEventDoc, BadgeDoc, CheckInDoc, DailyStatsDoc, OtpDoc, StampCardProgressDoc,
    UserBadgeDoc, UserDoc, UserProgressDoc, ValueEventDoc, ValueEventType,
    ACHIEVEMENT_EVENT_COLLECTION, BADGE_COLLECTION, CHECK_IN_COLLECTION,
    CONSUMED_NONCE_COLLECTION, ConsumedNonceDoc, DAILY_STATS_COLLECTION, OTP_COLLECTION,
    STAMP_CARD_COLLECTION, USER_BADGE_COLLECTION, USER_COLLECTION, USER_PROGRESS_COLLECTION,
    VALUE_EVENT_COLLECTION,
};
use crate::qr::NonceContext;
use crate::store::{
    AppliedEvent, DecideFn, EventDecision, EventSnapshot, LoyaltyStore, StampEventFilter,
};
use crate::types::{Result, StampgateError};

/// MongoDB-backed `LoyaltyStore`
pub struct MongoStore {
    client: MongoClient,
    nonces: MongoCollection<ConsumedNonceDoc>,
    value_events: MongoCollection<ValueEventDoc>,
    stamp_cards: MongoCollection<StampCardProgressDoc>,
    progress: MongoCollection<UserProgressDoc>,
    achievements: MongoCollection<AchievementEventDoc>,
    badges: MongoCollection<BadgeDoc>,
    user_badges: MongoCollection<UserBadgeDoc>,
    check_ins: MongoCollection<CheckInDoc>,
    daily_stats: MongoCollection<DailyStatsDoc>,
    users: MongoCollection<UserDoc>,
    otps: MongoCollection<OtpDoc>,
}

impl MongoStore {
    pub async fn new(client: MongoClient) -> Result<Self> {
        Ok(Self {
            nonces: client.collection(CONSUMED_NONCE_COLLECTION).await?,
            value_events: client.collection(VALUE_EVENT_COLLECTION).await?,
            stamp_cards: client.collection(STAMP_CARD_COLLECTION).await?,
            progress: client.collection(USER_PROGRESS_COLLECTION).await?,
            achievements: client.collection(ACHIEVEMENT_EVENT_COLLECTION).await?,
            badges: client.collection(BADGE_COLLECTION).await?,
            user_badges: client.collection(USER_BADGE_COLLECTION).await?,
            check_ins: client.collection(CHECK_IN_COLLECTION).await?,
            daily_stats: client.collection(DAILY_STATS_COLLECTION).await?,
            users: client.collection(USER_COLLECTION).await?,
            otps: client.collection(OTP_COLLECTION).await?,
            client,
        })
    }
}

#[async_trait]
impl LoyaltyStore for MongoStore {
    async fn consume_nonce(&self, jti: &str, ctx: NonceContext) -> Result<()> {
        let doc = ConsumedNonceDoc {
            jti: jti.to_string(),
            used_at: DateTime::now(),
            store_id: ctx.store_id,
            uid: ctx.subject,
            device_id: ctx.device_id,
        };
        match self.nonces.inner().insert_one(doc).await {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_key_error(&e) => Err(StampgateError::AlreadyUsed(format!(
                "nonce {} has already been used",
                jti
            ))),
            Err(e) => Err(StampgateError::Database(e.to_string())),
        }
    }

    async fn create_value_event(&self, event: ValueEventDoc) -> Result<bool> {
        match self.value_events.inner().insert_one(event).await {
            Ok(_) => Ok(true),
            Err(e) if is_duplicate_key_error(&e) => Ok(false),
            Err(e) => Err(StampgateError::Database(e.to_string())),
        }
    }

    async fn apply_value_event(
        &self,
        user_id: &str,
        store_id: &str,
        transaction_id: &str,
        decide: DecideFn<'_>,
    ) -> Result<AppliedEvent> {
        let mut session = self
            .client
            .inner()
            .start_session()
            .await
            .map_err(|e| StampgateError::Database(e.to_string()))?;
        session
            .start_transaction()
            .await
            .map_err(|e| StampgateError::Database(e.to_string()))?;

        let outcome: Result<AppliedEvent> = async {
            let event = self
                .value_events
                .inner()
                .find_one(doc! { "transaction_id": transaction_id })
                .session(&mut session)
                .await
                .map_err(|e| StampgateError::Database(e.to_string()))?
                .ok_or_else(|| {
                    StampgateError::NotFound(format!(
                        "value event {} not found",
                        transaction_id
                    ))
                })?;

            let card = self
                .stamp_cards
                .inner()
                .find_one(doc! { "user_id": user_id, "store_id": store_id })
                .session(&mut session)
                .await
                .map_err(|e| StampgateError::Database(e.to_string()))?;
            let progress = self
                .progress
                .inner()
                .find_one(doc! { "user_id": user_id })
                .session(&mut session)
                .await
                .map_err(|e| StampgateError::Database(e.to_string()))?;

            let snapshot = EventSnapshot {
                already_processed: event.processed,
                stored_summary: event.summary.clone(),
                stamps: card.map(|c| c.stamps).unwrap_or(0),
                experience: progress.map(|p| p.experience).unwrap_or(0),
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

                    self.stamp_cards
                        .inner()
                        .update_one(
                            doc! { "user_id": user_id, "store_id": store_id },
                            doc! { "$set": {
                                "stamps": stamps_after,
                                "last_visited_at": now,
                            }},
                        )
                        .upsert(true)
                        .session(&mut session)
                        .await
                        .map_err(|e| StampgateError::Database(e.to_string()))?;

                    self.progress
                        .inner()
                        .update_one(
                            doc! { "user_id": user_id },
                            doc! { "$set": {
                                "experience": experience_after,
                                "level": level_after as i64,
                                "updated_at": now,
                            }},
                        )
                        .upsert(true)
                        .session(&mut session)
                        .await
                        .map_err(|e| StampgateError::Database(e.to_string()))?;

                    let summary_bson = bson::to_bson(&summary)
                        .map_err(|e| StampgateError::Database(e.to_string()))?;
                    self.value_events
                        .inner()
                        .update_one(
                            doc! { "transaction_id": transaction_id },
                            doc! { "$set": {
                                "processed": true,
                                "summary": summary_bson,
                            }},
                        )
                        .session(&mut session)
                        .await
                        .map_err(|e| StampgateError::Database(e.to_string()))?;

                    Ok(AppliedEvent {
                        summary,
                        applied: true,
                    })
                }
            }
        }
        .await;

        match outcome {
            Ok(applied) => {
                session
                    .commit_transaction()
                    .await
                    .map_err(|e| StampgateError::Database(e.to_string()))?;
                Ok(applied)
            }
            Err(e) => {
                if let Err(abort_err) = session.abort_transaction().await {
                    warn!("failed to abort transaction: {}", abort_err);
                }
                Err(e)
            }
        }
    }

    async fn pending_value_events(&self, limit: usize) -> Result<Vec<ValueEventDoc>> {
        let cursor = self
            .value_events
            .inner()
            .find(doc! { "processed": false })
            .sort(doc! { "created_at": 1 })
            .limit(limit as i64)
            .await
            .map_err(|e| StampgateError::Database(e.to_string()))?;
        cursor
            .try_collect()
            .await
            .map_err(|e| StampgateError::Database(e.to_string()))
    }

    async fn count_stamp_events(&self, user_id: &str, filter: &StampEventFilter) -> Result<u64> {
        let mut query = doc! {
            "user_id": user_id,
            "event_type": ValueEventType::StampPunch.as_str(),
        };
        if let Some(since) = filter.since {
            query.insert("created_at", doc! { "$gte": since });
        }
        if let Some(weekday) = filter.weekday {
            query.insert("weekday", weekday);
        }
        if let Some(store_id) = &filter.store_id {
            query.insert("store_id", store_id);
        }
        self.value_events
            .inner()
            .count_documents(query)
            .await
            .map_err(|e| StampgateError::Database(e.to_string()))
    }

    async fn achievement_event(
        &self,
        user_id: &str,
        transaction_id: &str,
    ) -> Result<Option<AchievementEventDoc>> {
        self.achievements
            .inner()
            .find_one(doc! { "user_id": user_id, "transaction_id": transaction_id })
            .await
            .map_err(|e| StampgateError::Database(e.to_string()))
    }

    async fn put_achievement_event(&self, event: AchievementEventDoc) -> Result<()> {
        // $setOnInsert keeps the first write authoritative; a redelivered
        // event must not reset seen_at
        let on_insert =
            bson::to_document(&event).map_err(|e| StampgateError::Database(e.to_string()))?;
        self.achievements
            .inner()
            .update_one(
                doc! {
                    "user_id": &event.user_id,
                    "transaction_id": &event.transaction_id,
                },
                doc! { "$setOnInsert": on_insert },
            )
            .upsert(true)
            .await
            .map_err(|e| StampgateError::Database(e.to_string()))?;
        Ok(())
    }

    async fn unseen_achievement_events(&self, user_id: &str) -> Result<Vec<AchievementEventDoc>> {
        let cursor = self
            .achievements
            .inner()
            .find(doc! { "user_id": user_id, "seen_at": null })
            .sort(doc! { "created_at": -1 })
            .await
            .map_err(|e| StampgateError::Database(e.to_string()))?;
        cursor
            .try_collect()
            .await
            .map_err(|e| StampgateError::Database(e.to_string()))
    }

    async fn mark_achievement_seen(&self, user_id: &str, transaction_id: &str) -> Result<bool> {
        let result = self
            .achievements
            .inner()
            .update_one(
                doc! {
                    "user_id": user_id,
                    "transaction_id": transaction_id,
                    "seen_at": null,
                },
                doc! { "$set": { "seen_at": DateTime::now() } },
            )
            .await
            .map_err(|e| StampgateError::Database(e.to_string()))?;
        Ok(result.modified_count > 0)
    }

    async fn stamp_progress(
        &self,
        user_id: &str,
        store_id: &str,
    ) -> Result<Option<StampCardProgressDoc>> {
        self.stamp_cards
            .inner()
            .find_one(doc! { "user_id": user_id, "store_id": store_id })
            .await
            .map_err(|e| StampgateError::Database(e.to_string()))
    }

    async fn user_progress(&self, user_id: &str) -> Result<Option<UserProgressDoc>> {
        self.progress
            .inner()
            .find_one(doc! { "user_id": user_id })
            .await
            .map_err(|e| StampgateError::Database(e.to_string()))
    }

    async fn active_badges(&self) -> Result<Vec<BadgeDoc>> {
        let cursor = self
            .badges
            .inner()
            .find(doc! { "is_active": true })
            .await
            .map_err(|e| StampgateError::Database(e.to_string()))?;
        cursor
            .try_collect()
            .await
            .map_err(|e| StampgateError::Database(e.to_string()))
    }

    async fn owned_badge_count(&self, user_id: &str) -> Result<u64> {
        self.user_badges
            .inner()
            .count_documents(doc! { "user_id": user_id })
            .await
            .map_err(|e| StampgateError::Database(e.to_string()))
    }

    async fn grant_badge_if_absent(&self, grant: UserBadgeDoc) -> Result<bool> {
        match self.user_badges.inner().insert_one(grant).await {
            Ok(_) => Ok(true),
            Err(e) if is_duplicate_key_error(&e) => Ok(false),
            Err(e) => Err(StampgateError::Database(e.to_string())),
        }
    }

    async fn record_check_in(&self, check_in: CheckInDoc) -> Result<()> {
        self.check_ins
            .inner()
            .insert_one(check_in)
            .await
            .map_err(|e| StampgateError::Database(e.to_string()))?;
        Ok(())
    }

    async fn merge_daily_stats(&self, date: &str, user_id: &str) -> Result<()> {
        self.daily_stats
            .inner()
            .update_one(
                doc! { "date": date },
                doc! {
                    "$inc": { "total_check_ins": 1i64 },
                    "$addToSet": { "unique_users": user_id },
                    "$set": { "last_updated": DateTime::now() },
                },
            )
            .upsert(true)
            .await
            .map_err(|e| StampgateError::Database(e.to_string()))?;
        Ok(())
    }

    async fn find_user(&self, identifier: &str) -> Result<Option<UserDoc>> {
        self.users
            .inner()
            .find_one(doc! { "identifier": identifier })
            .await
            .map_err(|e| StampgateError::Database(e.to_string()))
    }

    async fn create_user(&self, user: UserDoc) -> Result<bool> {
        match self.users.inner().insert_one(user).await {
            Ok(_) => Ok(true),
            Err(e) if is_duplicate_key_error(&e) => Ok(false),
            Err(e) => Err(StampgateError::Database(e.to_string())),
        }
    }

    async fn mark_user_verified(&self, identifier: &str) -> Result<()> {
        self.users
            .inner()
            .update_one(
                doc! { "identifier": identifier },
                doc! { "$set": { "email_verified": true } },
            )
            .await
            .map_err(|e| StampgateError::Database(e.to_string()))?;
        Ok(())
    }

    async fn put_otp(&self, otp: OtpDoc) -> Result<()> {
        let on_set =
            bson::to_document(&otp).map_err(|e| StampgateError::Database(e.to_string()))?;
        self.otps
            .inner()
            .update_one(doc! { "identifier": &otp.identifier }, doc! { "$set": on_set })
            .upsert(true)
            .await
            .map_err(|e| StampgateError::Database(e.to_string()))?;
        Ok(())
    }

    async fn take_otp(&self, identifier: &str) -> Result<Option<OtpDoc>> {
        self.otps
            .inner()
            .find_one_and_delete(doc! { "identifier": identifier })
            .await
            .map_err(|e| StampgateError::Database(e.to_string()))
    }
}
