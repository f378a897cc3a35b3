use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::services::activation::ActivationLedger;
use crate::services::lockout::LoginAttemptTracker;

/// Periodically drops expired lockout records and old activation ledger entries.
pub fn spawn_housekeeping(
    attempts: Arc<dyn LoginAttemptTracker>,
    ledger: Arc<ActivationLedger>,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            match attempts.prune_expired().await {
                Ok(0) => {}
                Ok(removed) => tracing::debug!(removed, "Pruned expired login attempt records"),
                Err(e) => tracing::warn!(error = %e, "Failed to prune login attempt records"),
            }

            let removed = ledger.prune_expired();
            if removed > 0 {
                tracing::debug!(removed, "Pruned activation ledger entries");
            }
        }
    })
}
