//! Shared retry policy: bounded attempts with exponential backoff.

use std::time::Duration;

/// Exponential backoff shared by catalog lookups and content downloads.
/// `max_retries` is the number of retries after the first attempt, so the
/// total attempt budget is `max_retries + 1`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_retries: u32,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay before the given retry, 1-based: 2s, 4s, 8s, ...
    pub fn delay_for(&self, attempt: u32) -> Duration {
        Duration::from_secs(2u64.saturating_pow(attempt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = RetryPolicy::new(3);
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(3), Duration::from_secs(8));
    }

    #[test]
    fn zero_retries_means_single_attempt() {
        assert_eq!(RetryPolicy::new(0).max_retries(), 0);
    }
}
