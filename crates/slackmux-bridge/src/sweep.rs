//! Periodic expiry of stale pane bindings.

use std::time::Duration;

use slackmux_core::pane_map::SWEEP_INTERVAL_SECS;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::bridge::Bridge;

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(SWEEP_INTERVAL_SECS);

/// Spawn the sweeper. The first sweep runs one `every` after start.
pub fn spawn_sweeper(
    bridge: Bridge,
    ttl: chrono::Duration,
    every: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let reaped = bridge.sweep_expired(ttl).await;
                    if !reaped.is_empty() {
                        tracing::info!(count = reaped.len(), ?reaped, "swept expired bindings");
                    }
                }
            }
        }
        tracing::debug!("sweeper stopped");
    })
}
