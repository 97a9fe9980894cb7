//! Background compaction driver.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::limiter::RateLimiter;

/// Spawn a task that compacts `limiter` every `every`, out of band from
/// request handling. The first pass runs one full interval after spawning.
///
/// Abort the returned handle to stop compaction.
pub fn spawn_compaction(limiter: Arc<RateLimiter>, every: Duration) -> JoinHandle<()> {
    info!(interval = ?every, rate = limiter.rate(), "Starting compaction task");

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let evicted = limiter.compact();
            debug!(evicted, tracked = limiter.len(), "Compaction pass complete");
        }
    })
}
