//! Multiplexed session pool
//!
//! Manages a bounded set of authenticated remote-service sessions with
//! per-session concurrency limits, error-driven cooldown, and priority-fair
//! blocking acquisition. The pool reads identity records from
//! `session-store` (single source of truth) and maintains per-session
//! runtime state independently.
//!
//! Session lifecycle:
//! 1. Caller adds a session via `add_session` → record persisted, stats created
//! 2. Pool scans least-recently-used eligible sessions on `acquire` →
//!    lazily starts a client, takes a permit, returns the handle
//! 3. Caller reports the outcome via `release` → error accounting, possible
//!    cooldown, one permit returned, longest-waiting eligible waiter woken
//! 4. Repeated errors or a rate-limit signal → cooldown window, session
//!    skipped until the window elapses
//! 5. Cooldown expires → session eligible again, resuming from the back of
//!    the least-recently-used order
//! 6. Background sweep task probes live clients and drops dead ones; they
//!    restart transparently on the next acquisition

pub mod config;
pub mod cooldown;
pub mod error;
pub mod pool;
pub mod runtime;
pub mod stats;
pub mod sweep;
pub mod waiters;

mod metrics;

pub use config::PoolConfig;
pub use cooldown::CooldownRegistry;
pub use error::{Error, Result};
pub use pool::{AcquiredSession, PoolDiagnostics, SessionDiagnostics, SessionPool};
pub use runtime::{SessionClient, SessionConnector};
pub use stats::SessionStats;
pub use sweep::spawn_sweep_task;
pub use waiters::{Tier, WaiterQueues};
