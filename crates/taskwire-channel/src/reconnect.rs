//! Reconnection sequencing state.
//!
//! Wraps a [`BackoffPolicy`] with the two counters that walk a reconnection
//! sequence: failed attempts and the current delay. The first wait of a
//! sequence is the base delay; each subsequent wait is grown from the one
//! before it. A successful connection resets both counters.

use std::time::Duration;

use taskwire_core::retry::BackoffPolicy;

/// Failed-attempt counter and current delay of one reconnection sequence.
#[derive(Debug, Clone)]
pub struct ReconnectState {
    policy: BackoffPolicy,
    attempts: u32,
    current_delay_ms: u64,
}

impl ReconnectState {
    /// Fresh state at the policy's base delay.
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            attempts: 0,
            current_delay_ms: policy.base_delay_ms.min(policy.max_delay_ms),
            policy,
        }
    }

    /// Wait before the next attempt.
    ///
    /// Returns the current delay and grows it for the following call.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current_delay_ms;
        self.current_delay_ms = self.policy.next_after(delay);
        Duration::from_millis(delay)
    }

    /// A physical attempt failed.
    pub fn record_failure(&mut self) {
        self.attempts = self.attempts.saturating_add(1);
    }

    /// Whether the attempt ceiling has been reached.
    pub fn exhausted(&self) -> bool {
        self.policy.is_exhausted(self.attempts)
    }

    /// Failed attempts so far in this sequence.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Start over after a successful connection or a manual reset.
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.current_delay_ms = self.policy.base_delay_ms.min(self.policy.max_delay_ms);
    }
}
