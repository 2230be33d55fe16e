// src/client/retry.rs
use backon::ExponentialBuilder;
use std::time::Duration;

use super::ClientError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry,
    Fail,
}

/// Exponential backoff for the generation endpoint.
///
/// `max_retries` counts retries after the first attempt, so the default
/// allows four requests in total, waiting 0.8s, 1.6s and 3.2s in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(800),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    pub fn classify(&self, status: u16) -> RetryDecision {
        match status {
            429 | 500 | 502 | 503 | 504 => RetryDecision::Retry,
            _ => RetryDecision::Fail,
        }
    }

    /// Network failures and transient statuses are retried; everything the
    /// caller has to act on (bad input, blocked content, expired session) is not.
    pub fn should_retry(&self, err: &ClientError) -> bool {
        match err {
            ClientError::Timeout | ClientError::Transport(_) => true,
            ClientError::Status { status, .. } => self.classify(*status) == RetryDecision::Retry,
            _ => false,
        }
    }

    /// Wait before retry number `retry` (zero based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Doubling backoff without jitter, so waits strictly increase.
    pub fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.base_delay)
            .with_max_delay(self.delay_for(self.max_retries))
            .with_factor(2.0)
            .with_max_times(self.max_retries as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backon::BackoffBuilder;

    #[test]
    fn test_transient_statuses() {
        let policy = RetryPolicy::default();
        for status in [429, 500, 502, 503, 504] {
            assert_eq!(policy.classify(status), RetryDecision::Retry, "{}", status);
        }
        for status in [200, 400, 401, 403, 404, 405, 413, 501] {
            assert_eq!(policy.classify(status), RetryDecision::Fail, "{}", status);
        }
    }

    #[test]
    fn test_retryable_errors() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(&ClientError::Timeout));
        assert!(policy.should_retry(&ClientError::Transport("reset".to_string())));
        assert!(policy.should_retry(&ClientError::Status {
            status: 503,
            body: String::new()
        }));
        assert!(!policy.should_retry(&ClientError::Status {
            status: 400,
            body: String::new()
        }));
        assert!(!policy.should_retry(&ClientError::ContentBlocked("no image".to_string())));
        assert!(!policy.should_retry(&ClientError::SessionExpired));
        assert!(!policy.should_retry(&ClientError::InvalidResponseBody("<html>".to_string())));
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(800));
        assert_eq!(policy.delay_for(1), Duration::from_millis(1600));
        assert_eq!(policy.delay_for(2), Duration::from_millis(3200));
    }

    #[test]
    fn test_backoff_schedule() {
        let delays: Vec<Duration> = RetryPolicy::default().backoff().build().collect();
        let expected = [800u64, 1600, 3200];
        assert_eq!(delays.len(), expected.len());
        for (delay, millis) in delays.iter().zip(expected) {
            let diff = delay.as_secs_f64() - Duration::from_millis(millis).as_secs_f64();
            assert!(diff.abs() < 0.001, "{:?} vs {}ms", delay, millis);
        }
        assert!(delays.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_no_retries() {
        let delays: Vec<Duration> = RetryPolicy::new(0, Duration::from_millis(5))
            .backoff()
            .build()
            .collect();
        assert!(delays.is_empty());
    }

    #[test]
    fn test_backoff_saturates() {
        let policy = RetryPolicy::new(64, Duration::from_secs(1));
        assert!(policy.delay_for(40) >= policy.delay_for(31));
    }
}
