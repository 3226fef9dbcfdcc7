// Licensed under the MIT License.

//! Exponential-backoff reconnection for the gateway client (initial 2s, doubling,
//! capped at 60s). Deliberately without jitter, unlike
//! `azure_iot_operations_mqtt::session::reconnect_policy::ExponentialBackoffWithJitter`:
//! this is a fixed doubling sequence, not a randomized one.

use std::time::Duration;

/// Doubling backoff from `initial` up to `max`.
#[derive(Clone, Debug)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
}

impl Backoff {
    #[must_use]
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self { initial, max }
    }

    /// Delay to wait before the `attempt`-th reconnect (0-based: the first retry after
    /// the initial failure is `attempt = 0`).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        self.initial
            .checked_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX))
            .unwrap_or(self.max)
            .min(self.max)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(2), Duration::from_secs(60))
    }
}
