//! Periodic liveness sweep
//!
//! Spawns a background task that walks all live clients on an interval:
//! a flag-false client is dead outright; a flag-true client gets one
//! bounded health probe, since the flag can't see a stale half-open link.
//! Dead clients are purged from the live cache only — their stats,
//! cooldown, and permit state survive, so the session restarts
//! transparently on the next acquisition.
//!
//! The acquisition path runs its own cheap flag-only sweep; this task is
//! the slower, probing complement.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::pool::SessionPool;

/// Spawn the background liveness sweep.
///
/// Runs every `interval`. Returns a `JoinHandle` for the spawned task;
/// aborting it is the embedder's shutdown concern.
pub fn spawn_sweep_task(pool: Arc<SessionPool>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // Skip the immediate first tick — nothing is live yet at startup
        ticker.tick().await;

        loop {
            ticker.tick().await;
            sweep_cycle(&pool).await;
        }
    })
}

/// Run one sweep cycle over all live clients.
async fn sweep_cycle(pool: &SessionPool) {
    let probe_timeout = pool.config().probe_timeout();

    for (id, client) in pool.live_clients().await {
        if !client.is_connected() {
            pool.purge_client(&id).await;
            continue;
        }
        match tokio::time::timeout(probe_timeout, client.ping()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(session_id = %id, error = %e, "health probe failed, dropping client");
                pool.purge_client(&id).await;
            }
            Err(_) => {
                warn!(session_id = %id, "health probe timed out, dropping client");
                pool.purge_client(&id).await;
            }
        }
    }
}
