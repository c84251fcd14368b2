use std::time::Duration;

use rand::Rng;

pub const DEFAULT_BASE_DELAY_MS: u64 = 1_000;
pub const DEFAULT_MAX_DELAY_MS: u64 = 16_000;
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// Exponential reconnect schedule: `min(base * 2^(attempt-1), max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Consecutive failures tolerated before giving up. 0 retries forever.
    pub max_attempts: u32,
    /// Upper bound of the random delay added on top of the schedule.
    pub jitter: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
            max_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            jitter: Duration::ZERO,
        }
    }
}

impl BackoffPolicy {
    /// Delay before reconnect attempt `attempt` (1-indexed). Attempt 0 is
    /// treated like attempt 1.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32);
        let base_ms = self.base_delay.as_millis() as u64;
        let max_ms = self.max_delay.as_millis() as u64;
        let scaled = base_ms.saturating_mul(1u64 << exponent);
        Duration::from_millis(scaled.min(max_ms))
    }

    /// Scheduled delay plus a random share of the configured jitter.
    pub fn delay_with_jitter(&self, attempt: u32) -> Duration {
        let delay = self.delay_for_attempt(attempt);
        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return delay;
        }
        delay + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }

    pub fn attempts_exhausted(&self, attempt: u32) -> bool {
        self.max_attempts != 0 && attempt > self.max_attempts
    }

    /// Whole seconds shown to the user while waiting for `attempt`.
    pub fn countdown_seconds(&self, attempt: u32) -> u64 {
        (self.delay_for_attempt(attempt).as_millis() as u64).div_ceil(1000)
    }

    /// Delays for attempts `1..=count`.
    pub fn schedule(&self, count: u32) -> Vec<Duration> {
        (1..=count).map(|attempt| self.delay_for_attempt(attempt)).collect()
    }
}
