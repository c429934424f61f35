use std::time::Duration;

pub const BASE_DELAY: Duration = Duration::from_millis(500);
pub const MAX_DELAY: Duration = Duration::from_millis(5000);
pub const MAX_RETRIES: u32 = 14;

/// Exponential backoff between polls of a pending run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Pending polls tolerated before giving up.
    pub max_retries: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: BASE_DELAY,
            max_delay: MAX_DELAY,
            max_retries: MAX_RETRIES,
        }
    }
}

impl BackoffPolicy {
    /// Delay before the poll following retry `retry_count`:
    /// `min(max_delay, base_delay * 2^retry_count)`.
    #[must_use]
    pub fn delay(&self, retry_count: u32) -> Duration {
        1u32.checked_shl(retry_count)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Sum of every delay taken before retries run out.
    #[must_use]
    pub fn worst_case_wait(&self) -> Duration {
        (0..self.max_retries).map(|n| self.delay(n)).sum()
    }
}
