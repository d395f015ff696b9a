use std::time::Duration;

use crate::EngineConfig;

/// Exponential backoff between attempts of one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    base: Duration,
    max: Duration,
}

impl RetryPolicy {
    pub fn new(
        base: Duration,
        max: Duration,
    ) -> Self {
        Self {
            base,
            max,
        }
    }

    /// Wait after the failed attempt number `attempt` (0-based):
    /// `base * 2^attempt`, capped at `max`.
    pub fn backoff(
        &self,
        attempt: u32,
    ) -> Duration {
        2u32.checked_pow(attempt).and_then(|factor| self.base.checked_mul(factor)).map_or(self.max, |wait| wait.min(self.max))
    }
}

impl From<&EngineConfig> for RetryPolicy {
    fn from(config: &EngineConfig) -> Self {
        Self::new(config.retry_backoff_base(), config.retry_backoff_max())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::new(Duration::from_secs(1), Duration::from_secs(300));
        assert_eq!(policy.backoff(0), Duration::from_secs(1));
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(3), Duration::from_secs(8));
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy::new(Duration::from_secs(1), Duration::from_secs(300));
        assert_eq!(policy.backoff(9), Duration::from_secs(300));
        assert_eq!(policy.backoff(40), Duration::from_secs(300));
    }

    #[test]
    fn test_from_config() {
        let policy = RetryPolicy::from(&EngineConfig::default());
        assert_eq!(policy.backoff(0), Duration::from_millis(1000));
    }
}
