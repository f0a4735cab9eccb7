//! Capped-linear backoff for reconnect attempts.
//!
//! When the gateway connection drops for a retryable reason, the
//! lifecycle manager waits `base * attempt` before reconnecting, up to
//! a fixed cap, and gives up entirely once the attempt ceiling is hit.

use std::time::Duration;

/// Tunable parameters for the reconnect backoff strategy.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Per-attempt delay increment: attempt `n` waits `base * n`.
    pub base: Duration,

    /// Upper bound on the delay between attempts.
    pub cap: Duration,

    /// Ceiling on consecutive failed attempts before giving up.
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(3),
            cap: Duration::from_secs(30),
            max_retries: 5,
        }
    }
}

impl RetryPolicy {
    /// Delay scheduled before reconnect attempt `attempt` (1-based).
    ///
    /// Clamped to [`cap`](Self::cap), so consecutive delays are
    /// monotonically non-decreasing.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base.saturating_mul(attempt.max(1)).min(self.cap)
    }
}
