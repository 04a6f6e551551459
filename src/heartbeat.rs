use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};

use crate::state::AppState;

/// Spawn a background task that evicts connections that went quiet.
///
/// Runs every `heartbeat_interval`; anything silent for longer than
/// `heartbeat_timeout` is closed and goes through the normal disconnect path.
pub fn spawn_heartbeat_monitor(state: Arc<AppState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(state.config.heartbeat_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let evicted = state.evict_stale(Instant::now()).await;
            if !evicted.is_empty() {
                tracing::info!(count = evicted.len(), "Heartbeat evicted idle connections");
            }
        }
    })
}
