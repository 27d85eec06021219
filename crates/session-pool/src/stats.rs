//! Per-session runtime counters
//!
//! One `SessionStats` exists per session known to the pool: created on
//! `initialize`/`add_session`, removed on `remove_session`. The counters
//! drive scheduling (least-recently-used order) and cooldown decisions
//! (error accumulation); `in_flight` doubles as the over-release guard.

use tokio::time::Instant;

/// Runtime counters for one session.
#[derive(Debug, Default)]
pub struct SessionStats {
    /// Successful acquisitions over the pool's lifetime
    pub usage_count: u64,
    /// Time of the most recent successful acquisition
    pub last_used: Option<Instant>,
    /// Errors since the last cooldown trip (resets on trip)
    pub error_count: u32,
    /// Largest rate-limit wait reported for this session, informational
    pub flood_wait_secs: u64,
    /// Permits currently held; a release only returns a permit when this
    /// is positive
    pub in_flight: usize,
    /// Whether a runtime client is currently started
    pub is_client_started: bool,
    /// Last connection-start failure, for diagnostics
    pub last_start_error: Option<String>,
}

impl SessionStats {
    /// Record a successful acquisition.
    pub(crate) fn record_acquisition(&mut self, now: Instant) {
        self.usage_count += 1;
        self.last_used = Some(now);
        self.in_flight += 1;
    }

    /// Track the largest rate-limit wait seen for this session.
    pub(crate) fn record_flood_wait(&mut self, wait_secs: u64) {
        self.flood_wait_secs = self.flood_wait_secs.max(wait_secs);
    }
}
