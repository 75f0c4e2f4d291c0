use chrono::{DateTime, Duration, Utc};
use rand::Rng;

use crate::clock::Clock;

/// Default exponential base when no policy override is configured.
pub const DEFAULT_BASE_DELAY_MS: u64 = 2_000;
/// Delays are clamped here to bound worst-case staleness.
pub const DEFAULT_MAX_DELAY_MS: u64 = 120_000;

/// Jittered exponential backoff between retry attempts of a failing step.
///
/// The raw delay for a 1-based attempt number is `base * 2^(n-1)`,
/// multiplied by a uniform factor in `[0.75, 1.25]` so retries across
/// many runs don't land on the same instant, then clamped to `max`.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
        }
    }
}

impl BackoffPolicy {
    /// Delay in milliseconds before the given attempt may be retried.
    /// `attempt` is 1-based; 0 is treated as 1. The random source is a
    /// parameter so tests can seed it.
    pub fn delay_ms<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> u64 {
        let attempt = attempt.max(1);
        // Shift is bounded so the exponential term cannot overflow.
        let shift = (attempt - 1).min(20);
        let raw = self.base_delay_ms.saturating_mul(1u64 << shift);
        let jitter = 0.75 + rng.random::<f64>() * 0.5;
        let delayed = (raw as f64 * jitter) as u64;
        delayed.min(self.max_delay_ms)
    }
}

/// Convert a relative delay into an absolute deadline on the given clock.
pub fn deadline_from_now(clock: &dyn Clock, delay_ms: u64) -> DateTime<Utc> {
    clock.now() + Duration::milliseconds(delay_ms as i64)
}
