//! Pool facade: membership, acquisition, release, diagnostics
//!
//! The pool exclusively owns all runtime state (live clients, stats,
//! cooldowns, permit semaphores, waiter queues); the session store is the
//! single source of truth for identity and is only touched through its
//! narrow interface.
//!
//! Lock discipline: guards are taken in the order stats → cooldowns →
//! clients when nested, and never held across a connect, probe, or permit
//! wait. Each session's start lock serializes only the "start client if
//! not live" critical section, so distinct sessions connect in parallel
//! while duplicate starts of the same session are impossible.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use session_store::SessionStore;
use tokio::sync::{Mutex, RwLock, Semaphore};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::PoolConfig;
use crate::cooldown::CooldownRegistry;
use crate::metrics;
use crate::runtime::{SessionClient, SessionConnector};
use crate::stats::SessionStats;
use crate::waiters::{Tier, WaiterQueues};

/// A session handed out by the pool, ready for a remote operation.
///
/// The caller must return it via [`SessionPool::release`], reporting the
/// outcome; the permit it holds is not released on drop.
pub struct AcquiredSession {
    pub client: Arc<dyn SessionClient>,
    pub id: String,
}

impl fmt::Debug for AcquiredSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcquiredSession")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// Diagnostics snapshot for one session.
#[derive(Debug, Serialize)]
pub struct SessionDiagnostics {
    pub id: String,
    pub in_use: usize,
    pub capacity: usize,
    pub usage_count: u64,
    pub error_count: u32,
    pub flood_wait_secs: u64,
    pub cooling_down: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_remaining_secs: Option<u64>,
    pub client_started: bool,
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_start_error: Option<String>,
}

/// Pool-wide diagnostics snapshot.
///
/// Status mapping: all sessions eligible → healthy, some eligible →
/// degraded, none eligible (or empty pool) → unhealthy.
#[derive(Debug, Serialize)]
pub struct PoolDiagnostics {
    pub status: &'static str,
    pub sessions_total: usize,
    pub sessions_available: usize,
    pub sessions_cooling_down: usize,
    pub premium_waiters: usize,
    pub free_waiters: usize,
    pub sessions: Vec<SessionDiagnostics>,
}

/// Multiplexed session pool.
pub struct SessionPool {
    store: Arc<SessionStore>,
    connector: Arc<dyn SessionConnector>,
    config: PoolConfig,
    stats: RwLock<HashMap<String, SessionStats>>,
    cooldowns: RwLock<CooldownRegistry>,
    clients: RwLock<HashMap<String, Arc<dyn SessionClient>>>,
    permits: RwLock<HashMap<String, Arc<Semaphore>>>,
    start_locks: RwLock<HashMap<String, Arc<Mutex<()>>>>,
    waiters: Mutex<WaiterQueues>,
}

impl SessionPool {
    /// Create an empty pool. Call [`initialize`](Self::initialize) once at
    /// startup to load the active sessions from the store.
    pub fn new(
        store: Arc<SessionStore>,
        connector: Arc<dyn SessionConnector>,
        config: PoolConfig,
    ) -> Self {
        Self {
            store,
            connector,
            config,
            stats: RwLock::new(HashMap::new()),
            cooldowns: RwLock::new(CooldownRegistry::default()),
            clients: RwLock::new(HashMap::new()),
            permits: RwLock::new(HashMap::new()),
            start_locks: RwLock::new(HashMap::new()),
            waiters: Mutex::new(WaiterQueues::default()),
        }
    }

    /// Load all active records from the store and create runtime slots for
    /// each. Single-shot at startup; not designed for concurrent re-entry.
    pub async fn initialize(&self) {
        let records = self.store.find_active().await;
        for (id, _) in &records {
            self.register(id).await;
        }
        info!(sessions = records.len(), "session pool initialized");
    }

    /// Add a session (or re-register an existing one) and persist its
    /// record. Returns `false` if persistence fails; never panics.
    pub async fn add_session(&self, session_id: &str, credential: &str, device_label: &str) -> bool {
        if let Err(e) = self
            .store
            .upsert(session_id, credential, device_label, true)
            .await
        {
            warn!(session_id, error = %e, "failed to persist session record");
            return false;
        }
        self.register(session_id).await;
        info!(session_id, "session added to pool");
        true
    }

    /// Remove a session: delete its artifact manifest best-effort, mark the
    /// record inactive, stop any live client, and purge all runtime state.
    ///
    /// Returns `false` only if the persistence update fails; artifact
    /// cleanup failures are logged and don't block logical removal.
    pub async fn remove_session(&self, session_id: &str) -> bool {
        for path in self.store.artifacts(session_id).await {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                warn!(
                    session_id,
                    path = %path.display(),
                    error = %e,
                    "failed to remove session artifact"
                );
            }
        }

        if let Err(e) = self.store.mark_inactive(session_id).await {
            warn!(session_id, error = %e, "failed to mark session inactive");
            return false;
        }

        let client = self.clients.write().await.remove(session_id);
        if let Some(client) = client {
            client.disconnect().await;
        }
        self.stats.write().await.remove(session_id);
        self.cooldowns.write().await.remove(session_id);
        self.permits.write().await.remove(session_id);
        self.start_locks.write().await.remove(session_id);

        info!(session_id, "session removed from pool");
        true
    }

    /// Single non-blocking acquisition attempt.
    ///
    /// Scans cooldown-eligible sessions least-recently-used first, lazily
    /// starting clients and probing each permit semaphore for a short
    /// bounded window before moving on. `None` means no session is
    /// currently available — a normal empty result, not an error.
    pub async fn acquire(&self) -> Option<AcquiredSession> {
        let now = Instant::now();
        self.cooldowns.write().await.prune_expired(now);
        self.drop_dead_clients().await;

        let mut candidates: Vec<(String, Option<Instant>)> = {
            let stats = self.stats.read().await;
            let cooldowns = self.cooldowns.read().await;
            stats
                .iter()
                .filter(|(id, _)| cooldowns.eligible(id, now))
                .map(|(id, s)| (id.clone(), s.last_used))
                .collect()
        };
        // Least-recently-used first; never-used sessions sort ahead. This
        // spreads load and lets a session leaving cooldown resume gradually
        // instead of being starved behind busier peers.
        candidates.sort_by_key(|(_, last_used)| *last_used);

        for (id, _) in candidates {
            let Some(client) = self.ensure_started(&id).await else {
                continue;
            };
            let semaphore = match self.permits.read().await.get(&id) {
                Some(s) => s.clone(),
                None => continue,
            };
            match tokio::time::timeout(
                self.config.permit_probe(),
                semaphore.clone().acquire_owned(),
            )
            .await
            {
                Ok(Ok(permit)) => {
                    let mut stats = self.stats.write().await;
                    match stats.get_mut(&id) {
                        Some(s) => {
                            // Returned explicitly via release(), not on drop
                            permit.forget();
                            s.record_acquisition(Instant::now());
                            metrics::record_acquisition("hit");
                            debug!(session_id = %id, "session acquired");
                            return Some(AcquiredSession { client, id });
                        }
                        // Session removed while we probed; the permit drops
                        // back into the orphaned semaphore
                        None => continue,
                    }
                }
                // Semaphore closed or probe window elapsed; next candidate
                Ok(Err(_)) | Err(_) => continue,
            }
        }

        metrics::record_acquisition("empty");
        None
    }

    /// Blocking acquisition with priority-fair queueing.
    ///
    /// Registers a waiter in the tier's FIFO queue, then alternates between
    /// scan attempts and bounded waits for a wake signal until `timeout`
    /// expires. A wake is only an invitation to re-contend: the waiter
    /// re-runs the scan and, if it loses the race, queues afresh. Every
    /// exit path — success, timeout, or cancellation (receiver drop) —
    /// deregisters the waiter.
    pub async fn request(&self, tier: Tier, timeout: Duration) -> Option<AcquiredSession> {
        let deadline = Instant::now() + timeout;
        loop {
            let (waiter_id, rx) = self.waiters.lock().await.enqueue(tier);

            if let Some(acquired) = self.acquire().await {
                self.waiters.lock().await.remove(waiter_id);
                return Some(acquired);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                self.waiters.lock().await.remove(waiter_id);
                debug!(tier = tier.label(), "no session available within timeout");
                return None;
            }

            match tokio::time::timeout(remaining, rx).await {
                // Woken (or the queues were cleared): loop re-contends with
                // a fresh waiter; the old one was consumed by the wake
                Ok(_) => {}
                Err(_) => {
                    self.waiters.lock().await.remove(waiter_id);
                    debug!(tier = tier.label(), "request timed out waiting for a session");
                    return None;
                }
            }
        }
    }

    /// Return a session after an operation, reporting the outcome.
    ///
    /// `flood_wait_secs` is the rate-limit wait the remote service
    /// demanded, `0` if none. Error accounting may trip the session into
    /// cooldown; an over-threshold flood wait always does, with a window
    /// scaled from the reported wait that overwrites any window already in
    /// effect. Exactly one permit is returned per matching acquire — a
    /// second release for the same acquisition is logged and keeps the
    /// permit count intact. Finally the longest-waiting eligible waiter is
    /// woken.
    pub async fn release(&self, session_id: &str, had_error: bool, flood_wait_secs: u64) {
        let mut trip: Option<(Duration, &'static str)> = None;
        let permit_returned;
        {
            let mut stats = self.stats.write().await;
            let Some(s) = stats.get_mut(session_id) else {
                warn!(session_id, "release for unknown session, ignoring");
                return;
            };

            if had_error {
                s.error_count += 1;
                if s.error_count >= self.config.error_threshold {
                    s.error_count = 0;
                    trip = Some((self.config.base_cooldown(), "errors"));
                }
            }

            if flood_wait_secs > 0 {
                s.record_flood_wait(flood_wait_secs);
            }
            if flood_wait_secs > self.config.flood_wait_threshold_secs {
                // The explicit rate-limit signal dominates the generic
                // error cooldown
                trip = Some((
                    self.config.flood_wait_cooldown(flood_wait_secs),
                    "flood_wait",
                ));
            }

            if s.in_flight > 0 {
                s.in_flight -= 1;
                permit_returned = true;
            } else {
                warn!(session_id, "release without a matching acquire, permit kept");
                permit_returned = false;
            }
        }

        if let Some((duration, reason)) = trip {
            info!(
                session_id,
                cooldown_secs = duration.as_secs(),
                reason,
                "session entering cooldown"
            );
            metrics::record_cooldown(reason);
            self.cooldowns.write().await.apply(session_id, duration);
        }

        if permit_returned
            && let Some(semaphore) = self.permits.read().await.get(session_id)
        {
            semaphore.add_permits(1);
        }

        self.waiters.lock().await.wake_one();
    }

    /// Structured snapshot of the whole pool for external reporting.
    pub async fn diagnostics(&self) -> PoolDiagnostics {
        let now = Instant::now();
        let stats = self.stats.read().await;
        let cooldowns = self.cooldowns.read().await;
        let clients = self.clients.read().await;
        let (premium_waiters, free_waiters) = self.waiters.lock().await.counts();

        let mut sessions = Vec::with_capacity(stats.len());
        let mut available = 0usize;
        let mut cooling = 0usize;
        for (id, s) in stats.iter() {
            let remaining = cooldowns.remaining(id, now);
            let cooling_down = remaining.is_some();
            if cooling_down {
                cooling += 1;
            } else {
                available += 1;
            }
            sessions.push(SessionDiagnostics {
                id: id.clone(),
                in_use: s.in_flight,
                capacity: self.config.per_session_concurrency,
                usage_count: s.usage_count,
                error_count: s.error_count,
                flood_wait_secs: s.flood_wait_secs,
                cooling_down,
                cooldown_remaining_secs: remaining.map(|d| d.as_secs()),
                client_started: s.is_client_started,
                connected: clients.get(id).map(|c| c.is_connected()).unwrap_or(false),
                last_start_error: s.last_start_error.clone(),
            });
        }
        sessions.sort_by(|a, b| a.id.cmp(&b.id));

        let total = stats.len();
        let status = if available == total && total > 0 {
            "healthy"
        } else if available > 0 {
            "degraded"
        } else {
            "unhealthy"
        };

        PoolDiagnostics {
            status,
            sessions_total: total,
            sessions_available: available,
            sessions_cooling_down: cooling,
            premium_waiters,
            free_waiters,
            sessions,
        }
    }

    /// Stop all live clients and clear all in-memory state. Persisted
    /// records are untouched; pending waiters are dropped and their
    /// `request` calls fall back to polling until their own timeouts.
    pub async fn cleanup(&self) {
        let clients: Vec<(String, Arc<dyn SessionClient>)> =
            self.clients.write().await.drain().collect();
        for (id, client) in clients {
            client.disconnect().await;
            debug!(session_id = %id, "session client stopped");
        }
        self.stats.write().await.clear();
        self.cooldowns.write().await.clear();
        self.permits.write().await.clear();
        self.start_locks.write().await.clear();
        self.waiters.lock().await.clear();
        info!("session pool cleaned up");
    }

    /// Pool configuration.
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Snapshot of live clients, for the background sweep.
    pub(crate) async fn live_clients(&self) -> Vec<(String, Arc<dyn SessionClient>)> {
        self.clients
            .read()
            .await
            .iter()
            .map(|(id, c)| (id.clone(), c.clone()))
            .collect()
    }

    /// Tear down one client found dead: purge it from the live cache only.
    /// Stats, cooldown, and permit state survive so the session restarts
    /// transparently on the next acquisition.
    pub(crate) async fn purge_client(&self, session_id: &str) {
        let client = {
            let mut stats = self.stats.write().await;
            let mut clients = self.clients.write().await;
            let client = clients.remove(session_id);
            if client.is_some()
                && let Some(s) = stats.get_mut(session_id)
            {
                s.is_client_started = false;
            }
            client
        };
        if let Some(client) = client {
            client.disconnect().await;
            info!(session_id, "purged dead session client");
        }
    }

    /// Create runtime slots for a session: fresh stats, a full-capacity
    /// permit semaphore, and a start lock if one doesn't exist yet.
    ///
    /// The semaphore is recreated rather than reused: stats reset
    /// `in_flight` to zero, so a reused semaphore would strand the permits
    /// forgotten by still-in-flight acquisitions (their releases fall on
    /// the `in_flight` guard and never return them). Those stale releases
    /// are harmless against the fresh semaphore for the same reason.
    async fn register(&self, session_id: &str) {
        self.stats
            .write()
            .await
            .insert(session_id.to_string(), SessionStats::default());
        self.permits.write().await.insert(
            session_id.to_string(),
            Arc::new(Semaphore::new(self.config.per_session_concurrency)),
        );
        self.start_locks
            .write()
            .await
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())));
    }

    /// Opportunistic sweep on the acquisition path: drop clients whose
    /// cheap liveness flag reports dead. The background sweep task handles
    /// the ambiguous flag-true cases with a bounded probe.
    async fn drop_dead_clients(&self) {
        let dead: Vec<String> = {
            let clients = self.clients.read().await;
            clients
                .iter()
                .filter(|(_, c)| !c.is_connected())
                .map(|(id, _)| id.clone())
                .collect()
        };
        if dead.is_empty() {
            return;
        }
        let mut stats = self.stats.write().await;
        let mut clients = self.clients.write().await;
        for id in dead {
            if clients.remove(&id).is_some() {
                if let Some(s) = stats.get_mut(&id) {
                    s.is_client_started = false;
                }
                info!(session_id = %id, "dropped dead session client");
            }
        }
    }

    /// Get the live client for a session, starting one if needed.
    ///
    /// The per-session start lock guards the check-then-connect window so
    /// two concurrent acquisitions can't start duplicate clients. A start
    /// failure is recorded in the session's stats and reported as `None`;
    /// the next acquisition attempt retries.
    async fn ensure_started(&self, session_id: &str) -> Option<Arc<dyn SessionClient>> {
        if let Some(client) = self.clients.read().await.get(session_id) {
            return Some(client.clone());
        }

        let start_lock = self.start_locks.read().await.get(session_id)?.clone();
        let _guard = start_lock.lock().await;

        // Second check under the start lock: another caller may have won
        if let Some(client) = self.clients.read().await.get(session_id) {
            return Some(client.clone());
        }

        let record = match self.store.find_one(session_id).await {
            Some(r) => r,
            None => {
                warn!(session_id, "session known to pool but missing from store");
                return None;
            }
        };

        match self
            .connector
            .connect(session_id, &record.credential, &record.device_label)
            .await
        {
            Ok(client) => {
                self.clients
                    .write()
                    .await
                    .insert(session_id.to_string(), client.clone());
                if let Some(s) = self.stats.write().await.get_mut(session_id) {
                    s.is_client_started = true;
                    s.last_start_error = None;
                }
                info!(session_id, "session client started");
                Some(client)
            }
            Err(e) => {
                metrics::record_connect_failure();
                warn!(session_id, error = %e, "failed to start session client");
                if let Some(s) = self.stats.write().await.get_mut(session_id) {
                    s.is_client_started = false;
                    s.last_start_error = Some(e.to_string());
                }
                None
            }
        }
    }
}
