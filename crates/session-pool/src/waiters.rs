//! Priority-fair waiter queues
//!
//! Two FIFO queues of pending blocking acquisitions, served premium-first
//! on every wake. A wake is only a signal: the woken waiter re-runs the
//! acquisition scan and re-contends for the freed permit generically,
//! which sidesteps lost-wakeup/double-grant races when several releases
//! land close together.
//!
//! The free tier has no aging or max-wait promotion; under sustained
//! premium load free waiters wait until their own timeout.

use std::collections::VecDeque;

use tokio::sync::oneshot;
use tracing::debug;

/// Priority tier of a blocking acquisition. Determines queue-service
/// order only, never permit capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Premium,
    Free,
}

impl Tier {
    /// Tier label for logging and diagnostics.
    pub fn label(&self) -> &'static str {
        match self {
            Tier::Premium => "premium",
            Tier::Free => "free",
        }
    }
}

/// Handle for deregistering a queued waiter.
pub type WaiterId = u64;

/// The two tier queues plus the ID counter.
#[derive(Debug, Default)]
pub struct WaiterQueues {
    premium: VecDeque<(WaiterId, oneshot::Sender<()>)>,
    free: VecDeque<(WaiterId, oneshot::Sender<()>)>,
    next_id: WaiterId,
}

impl WaiterQueues {
    /// Register a waiter at the tail of its tier's queue.
    ///
    /// The returned receiver resolves when the waiter is woken. Dropping
    /// the receiver (cancellation, timeout) is enough to invalidate the
    /// waiter — closed senders are pruned on the next wake — but callers
    /// should still `remove` explicitly so queue counts stay accurate.
    pub fn enqueue(&mut self, tier: Tier) -> (WaiterId, oneshot::Receiver<()>) {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        let (tx, rx) = oneshot::channel();
        match tier {
            Tier::Premium => self.premium.push_back((id, tx)),
            Tier::Free => self.free.push_back((id, tx)),
        }
        (id, rx)
    }

    /// Deregister a waiter from whichever queue holds it.
    ///
    /// Scans both queues: a waiter must never survive its owning call,
    /// so removal is unconditional and idempotent.
    pub fn remove(&mut self, waiter_id: WaiterId) {
        self.premium.retain(|(id, _)| *id != waiter_id);
        self.free.retain(|(id, _)| *id != waiter_id);
    }

    /// Wake the longest-waiting eligible waiter, premium tier first.
    ///
    /// Prunes abandoned waiters along the way. Returns whether anyone
    /// was actually signalled.
    pub fn wake_one(&mut self) -> bool {
        self.prune();
        for queue in [&mut self.premium, &mut self.free] {
            while let Some((id, tx)) = queue.pop_front() {
                // send fails only if the receiver was dropped between the
                // prune and here; skip to the next waiter
                if tx.send(()).is_ok() {
                    debug!(waiter_id = id, "woke queued waiter");
                    return true;
                }
            }
        }
        false
    }

    /// Current queue depths as `(premium, free)`.
    pub fn counts(&self) -> (usize, usize) {
        (self.premium.len(), self.free.len())
    }

    /// Drop all waiters; their receivers resolve with an error.
    pub fn clear(&mut self) {
        self.premium.clear();
        self.free.clear();
    }

    fn prune(&mut self) {
        self.premium.retain(|(_, tx)| !tx.is_closed());
        self.free.retain(|(_, tx)| !tx.is_closed());
    }
}
