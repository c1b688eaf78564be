//! Reconnection policy for the transport loop.
//!
//! Sessions are short-lived, so the delay is fixed rather than
//! exponential. At most one connection attempt is ever in flight; the
//! loop sleeps for [`ReconnectPolicy::next_delay`] between attempts and
//! calls [`ReconnectPolicy::on_success`] when a connection is
//! established.

use std::time::Duration;

/// Explicit retry state machine: fixed delay, attempt counter reset on
/// success.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    delay: Duration,
    attempt: u32,
}

impl ReconnectPolicy {
    pub fn new(delay: Duration) -> Self {
        Self { delay, attempt: 0 }
    }

    /// Delay to wait before the next attempt; increments the counter.
    pub fn next_delay(&mut self) -> Duration {
        self.attempt = self.attempt.saturating_add(1);
        self.delay
    }

    /// Attempts made since the last successful connection.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Record a successful connection, resetting the attempt counter.
    pub fn on_success(&mut self) {
        self.attempt = 0;
    }
}
