//! Pool metrics
//!
//! Emits through the `metrics` facade:
//!
//! - `session_pool_acquisitions_total` (counter): label `outcome`
//! - `session_pool_cooldowns_total` (counter): label `reason`
//! - `session_pool_connect_failures_total` (counter)
//!
//! Recorder installation is the embedding binary's concern; without one
//! these calls are no-ops.

/// Record the outcome of one acquisition attempt.
pub(crate) fn record_acquisition(outcome: &'static str) {
    metrics::counter!("session_pool_acquisitions_total", "outcome" => outcome).increment(1);
}

/// Record a session entering cooldown.
pub(crate) fn record_cooldown(reason: &'static str) {
    metrics::counter!("session_pool_cooldowns_total", "reason" => reason).increment(1);
}

/// Record a failed connection start.
pub(crate) fn record_connect_failure() {
    metrics::counter!("session_pool_connect_failures_total").increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_functions_do_not_panic_without_recorder() {
        // When no recorder is installed, metrics calls are no-ops.
        // This verifies the functions don't panic in test environments.
        record_acquisition("hit");
        record_acquisition("empty");
        record_cooldown("errors");
        record_cooldown("flood_wait");
        record_connect_failure();
    }
}
