//! Per-session cooldown registry
//!
//! A session with an unexpired entry is excluded from acquisition.
//! Entries are overwritten, never stacked: a new qualifying event replaces
//! the window start and duration wholesale, even when the replacement
//! window ends sooner than the one it displaced.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
struct CooldownEntry {
    started_at: Instant,
    duration: Duration,
}

/// Penalty-box timestamps, keyed by session ID.
#[derive(Debug, Default)]
pub struct CooldownRegistry {
    entries: HashMap<String, CooldownEntry>,
}

impl CooldownRegistry {
    /// Start (or refresh) a cooldown window for a session.
    pub fn apply(&mut self, session_id: &str, duration: Duration) {
        self.entries.insert(
            session_id.to_string(),
            CooldownEntry {
                started_at: Instant::now(),
                duration,
            },
        );
    }

    /// Whether a session may be acquired at `now`.
    ///
    /// True when no entry exists or the window has elapsed. Expired
    /// entries are left in place and dropped lazily by `prune_expired`.
    pub fn eligible(&self, session_id: &str, now: Instant) -> bool {
        match self.entries.get(session_id) {
            None => true,
            Some(entry) => now >= entry.started_at + entry.duration,
        }
    }

    /// Remaining cooldown time, `None` if the session isn't cooling down.
    pub fn remaining(&self, session_id: &str, now: Instant) -> Option<Duration> {
        let entry = self.entries.get(session_id)?;
        let end = entry.started_at + entry.duration;
        if now >= end {
            None
        } else {
            Some(end - now)
        }
    }

    /// Drop a session's entry, cooling or not.
    pub fn remove(&mut self, session_id: &str) {
        self.entries.remove(session_id);
    }

    /// Drop all entries whose windows have elapsed by `now`.
    pub fn prune_expired(&mut self, now: Instant) {
        self.entries
            .retain(|_, entry| now < entry.started_at + entry.duration);
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of sessions currently in cooldown at `now`.
    pub fn cooling_count(&self, now: Instant) -> usize {
        self.entries
            .values()
            .filter(|entry| now < entry.started_at + entry.duration)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn unknown_session_is_eligible() {
        let registry = CooldownRegistry::default();
        assert!(registry.eligible("s1", Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn session_ineligible_until_window_elapses() {
        let mut registry = CooldownRegistry::default();
        registry.apply("s1", Duration::from_secs(300));

        assert!(!registry.eligible("s1", Instant::now()));
        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(!registry.eligible("s1", Instant::now()));
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(registry.eligible("s1", Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn reapply_overwrites_window() {
        let mut registry = CooldownRegistry::default();
        registry.apply("s1", Duration::from_secs(300));

        tokio::time::advance(Duration::from_secs(200)).await;
        // A shorter replacement window wins: 30s from now, not 100s
        registry.apply("s1", Duration::from_secs(30));

        assert_eq!(
            registry.remaining("s1", Instant::now()),
            Some(Duration::from_secs(30))
        );
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(registry.eligible("s1", Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn remaining_reports_none_after_expiry() {
        let mut registry = CooldownRegistry::default();
        registry.apply("s1", Duration::from_secs(10));

        assert_eq!(
            registry.remaining("s1", Instant::now()),
            Some(Duration::from_secs(10))
        );
        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(registry.remaining("s1", Instant::now()), None);
    }

    #[tokio::test(start_paused = true)]
    async fn prune_drops_only_expired_entries() {
        let mut registry = CooldownRegistry::default();
        registry.apply("short", Duration::from_secs(10));
        registry.apply("long", Duration::from_secs(100));

        tokio::time::advance(Duration::from_secs(50)).await;
        registry.prune_expired(Instant::now());

        assert!(registry.eligible("short", Instant::now()));
        assert_eq!(registry.cooling_count(Instant::now()), 1);
        assert!(!registry.eligible("long", Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn remove_clears_active_cooldown() {
        let mut registry = CooldownRegistry::default();
        registry.apply("s1", Duration::from_secs(300));
        registry.remove("s1");
        assert!(registry.eligible("s1", Instant::now()));
    }
}
