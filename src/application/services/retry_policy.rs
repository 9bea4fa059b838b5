//! Backoff schedule for transient delivery failures.

use std::time::Duration;

/// Default number of attempts before an upload is marked failed.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(2);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(60);
const DEFAULT_JITTER_MAX: Duration = Duration::from_millis(500);

/// Bounded exponential backoff for transient upload failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after which an item is marked failed.
    pub max_attempts: u32,
    /// Delay after the first failure.
    pub base_delay: Duration,
    /// Cap on the exponential delay.
    pub max_delay: Duration,
    /// Upper bound of the random extra delay.
    pub jitter_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            jitter_max: DEFAULT_JITTER_MAX,
        }
    }
}

impl RetryPolicy {
    /// Sets the attempt ceiling.
    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the first delay.
    #[must_use]
    pub const fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Sets the delay cap.
    #[must_use]
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the jitter bound. Zero disables jitter.
    #[must_use]
    pub const fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter_max = jitter;
        self
    }

    /// Whether an item that has now failed `attempts` times is done for.
    #[must_use]
    pub const fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }

    /// Delay before the next attempt after `attempts` failures (1-based).
    #[must_use]
    pub fn delay_for(&self, attempts: u32) -> Duration {
        self.backoff_without_jitter(attempts) + rand_jitter(self.jitter_max)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn backoff_without_jitter(&self, attempts: u32) -> Duration {
        let base = self.base_delay.as_millis() as u64;
        let max = self.max_delay.as_millis() as u64;
        let exponent = attempts.saturating_sub(1).min(16);

        let exponential = base.saturating_mul(2_u64.saturating_pow(exponent));
        Duration::from_millis(exponential.min(max))
    }
}

#[allow(clippy::cast_possible_truncation)]
fn rand_jitter(max: Duration) -> Duration {
    use std::time::SystemTime;

    let max = max.as_millis() as u64;
    if max == 0 {
        return Duration::ZERO;
    }

    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| u64::from(d.subsec_nanos()))
        .unwrap_or(0);

    Duration::from_millis(nanos % max)
}
