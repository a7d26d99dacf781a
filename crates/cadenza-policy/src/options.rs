use std::{cmp::min, time::Duration};

/// Exponential retry backoff: `base * 2^(attempt - 1)`, capped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryBackoff {
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryBackoff {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryBackoff {
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
        }
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 2_u32.checked_pow(attempt - 1).unwrap_or(u32::MAX);
        min(self.base_delay.saturating_mul(factor), self.max_delay)
    }
}

/// Configuration of [`DefaultLoadErrorHandlingPolicy`](crate::DefaultLoadErrorHandlingPolicy).
#[derive(Clone, Debug)]
pub struct LoadErrorOptions {
    pub backoff: RetryBackoff,
    pub default_min_retry_count: u32,
    /// Overrides the default for media loads.
    pub media_min_retry_count: Option<u32>,
    pub location_exclusion: Duration,
    pub track_exclusion: Duration,
}

impl Default for LoadErrorOptions {
    fn default() -> Self {
        Self {
            backoff: RetryBackoff::default(),
            default_min_retry_count: 3,
            media_min_retry_count: None,
            location_exclusion: Duration::from_secs(5 * 60),
            track_exclusion: Duration::from_secs(60),
        }
    }
}

impl LoadErrorOptions {
    pub fn with_backoff(mut self, backoff: RetryBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_default_min_retry_count(mut self, count: u32) -> Self {
        self.default_min_retry_count = count;
        self
    }

    pub fn with_media_min_retry_count(mut self, count: u32) -> Self {
        self.media_min_retry_count = Some(count);
        self
    }

    pub fn with_location_exclusion(mut self, duration: Duration) -> Self {
        self.location_exclusion = duration;
        self
    }

    pub fn with_track_exclusion(mut self, duration: Duration) -> Self {
        self.track_exclusion = duration;
        self
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(0, Duration::ZERO)]
    #[case(1, Duration::from_secs(1))]
    #[case(2, Duration::from_secs(2))]
    #[case(3, Duration::from_secs(4))]
    #[case(4, Duration::from_secs(5))]
    #[case(40, Duration::from_secs(5))]
    fn default_backoff(#[case] attempt: u32, #[case] expected: Duration) {
        assert_eq!(RetryBackoff::default().delay_for_attempt(attempt), expected);
    }

    #[test]
    fn zero_base_never_waits() {
        let backoff = RetryBackoff::new(Duration::ZERO, Duration::from_secs(1));
        assert!((0..10).all(|n| backoff.delay_for_attempt(n).is_zero()));
    }
}
