//! Clip retry policy with exponential backoff.

use std::time::Duration;

use storyclip_media::MediaError;

use crate::config::SupervisorConfig;

/// When and how long to wait before re-rendering a failed clip.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts (not including the initial attempt).
    pub max_retries: u32,
    /// Base delay for exponential backoff (doubles each attempt).
    pub base_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &SupervisorConfig) -> Self {
        Self {
            max_retries: config.max_clip_retries,
            base_delay: config.retry_base_delay,
            ..Default::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self.base_delay.saturating_mul(2u32.pow(exponent));
        delay.min(self.max_delay)
    }

    /// Whether a clip that failed on attempt `attempts` gets another try.
    pub fn should_retry(&self, attempts: u32, error: &MediaError) -> bool {
        error.is_retryable() && attempts <= self.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_delay_calculation() {
        let policy = RetryPolicy::default().with_base_delay(Duration::from_millis(100));

        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(400));
    }

    #[test]
    fn test_delay_capped() {
        let policy = RetryPolicy::default().with_base_delay(Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(40), Duration::from_secs(10));
    }

    #[test]
    fn test_should_retry() {
        let policy = RetryPolicy::default().with_max_retries(1);
        let timeout = MediaError::Timeout(Duration::from_secs(1));
        let missing = MediaError::output_missing(PathBuf::from("/tmp/clip_001.mp4"));
        let exit = MediaError::engine_exit(Some(1), "bad filter");

        assert!(policy.should_retry(1, &timeout));
        assert!(!policy.should_retry(2, &timeout));
        assert!(policy.should_retry(1, &missing));
        assert!(!policy.should_retry(1, &exit));
        assert!(!policy.should_retry(1, &MediaError::Cancelled));
        assert!(!RetryPolicy::default().with_max_retries(0).should_retry(1, &timeout));
    }
}
