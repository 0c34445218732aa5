//! Reconnection backoff parameters and delay math.
//!
//! Sync-only building blocks; the stateful counter that walks through a
//! reconnection sequence lives in `taskwire-channel`.
//!
//! - [`BackoffPolicy`]: base/max delay, attempt ceiling, jitter bound
//! - [`grow_delay`]: `min(current * 2 + jitter, max)` with fresh randomness
//! - [`grow_delay_with_random`]: the same with an explicit random draw

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Default initial backoff in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;
/// Default backoff ceiling in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;
/// Default number of failed attempts before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
/// Default upper bound of the additive jitter in milliseconds.
pub const DEFAULT_JITTER_MS: u64 = 1000;

/// Parameters of the reconnection backoff.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackoffPolicy {
    /// First delay of every reconnection sequence.
    pub base_delay_ms: u64,
    /// Delays never exceed this value.
    pub max_delay_ms: u64,
    /// Failed attempts allowed before the sequence is exhausted.
    pub max_attempts: u32,
    /// Upper bound of the random amount added on each growth step.
    pub jitter_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            jitter_ms: DEFAULT_JITTER_MS,
        }
    }
}

impl BackoffPolicy {
    /// Whether `failed_attempts` has reached the ceiling.
    pub fn is_exhausted(&self, failed_attempts: u32) -> bool {
        failed_attempts >= self.max_attempts
    }

    /// Delay that follows `current_ms`, drawing fresh jitter.
    pub fn next_after(&self, current_ms: u64) -> u64 {
        grow_delay(current_ms, self.max_delay_ms, self.jitter_ms)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Backoff calculation
// ─────────────────────────────────────────────────────────────────────────────

/// Grow a delay: `min(current * 2 + jitter, max)`.
///
/// `jitter` is drawn uniformly from `[0, jitter_ms)` on every call so that
/// clients dropped by the same outage do not retry in lockstep.
#[must_use]
pub fn grow_delay(current_ms: u64, max_delay_ms: u64, jitter_ms: u64) -> u64 {
    grow_delay_with_random(current_ms, max_delay_ms, jitter_ms, rand::random::<f64>())
}

/// Grow a delay with an explicit random draw.
///
/// `random` should be a value in `[0.0, 1.0)` from a PRNG; it is clamped.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn grow_delay_with_random(
    current_ms: u64,
    max_delay_ms: u64,
    jitter_ms: u64,
    random: f64,
) -> u64 {
    let jitter = ((jitter_ms as f64) * random.clamp(0.0, 1.0)).round() as u64;
    current_ms
        .saturating_mul(2)
        .saturating_add(jitter)
        .min(max_delay_ms)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
