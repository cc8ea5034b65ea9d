//! Value-event dispatcher
//!
//! Sweeps unprocessed transaction records and runs them through the
//! achievement ledger. The HTTP paths already process events inline;
//! this loop is the at-least-once backstop for events whose inline
//! processing died mid-flight (the ledger's idempotency markers make
//! redelivery harmless).

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::ledger::AchievementLedger;
use crate::notify::Notifier;
use crate::store::LoyaltyStore;

/// Max events picked up per sweep
const DISPATCH_BATCH: usize = 50;

/// Spawn the background dispatch loop
pub fn spawn_dispatch_task(
    store: Arc<dyn LoyaltyStore>,
    ledger: Arc<AchievementLedger>,
    notifier: Arc<dyn Notifier>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = sweep(&store, &ledger, &notifier).await {
                warn!("dispatch sweep failed: {}", e);
            }
        }
    })
}

async fn sweep(
    store: &Arc<dyn LoyaltyStore>,
    ledger: &AchievementLedger,
    notifier: &Arc<dyn Notifier>,
) -> crate::types::Result<()> {
    let pending = store.pending_value_events(DISPATCH_BATCH).await?;
    if pending.is_empty() {
        return Ok(());
    }
    debug!(count = pending.len(), "dispatching pending value events");

    for event in &pending {
        match ledger.process(event).await {
            Ok(summary) => {
                notifier.notify_achievement(&event.user_id, &summary).await;
            }
            Err(e) => {
                // Left pending; the next sweep retries it
                warn!(
                    transaction_id = %event.transaction_id,
                    user_id = %event.user_id,
                    "failed to process value event: {}", e,
                );
            }
        }
    }
    Ok(())
}
