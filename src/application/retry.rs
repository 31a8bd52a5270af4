use std::time::Duration;

use rand::Rng;

use crate::config::LedgerConfig;

/// Bounded retry schedule for commits that lose a race with another writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&LedgerConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &LedgerConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_backoff: config.base_backoff,
            max_backoff: config.max_backoff,
        }
    }

    /// Upper bound of the wait after failed attempt number `attempt` (1-based):
    /// doubles every attempt, capped at `max_backoff`.
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    /// Randomized wait in `[ceiling / 2, ceiling]` so racing replicas spread out.
    pub fn delay(&self, attempt: u32) -> Duration {
        let ceiling = self.ceiling(attempt).as_micros().min(u64::MAX as u128) as u64;
        if ceiling == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(rand::thread_rng().gen_range(ceiling / 2..=ceiling))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 5,
            base_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(100),
        }
    }

    #[test]
    fn test_ceiling_doubles_then_caps() {
        let p = policy();
        assert_eq!(p.ceiling(1), Duration::from_millis(10));
        assert_eq!(p.ceiling(2), Duration::from_millis(20));
        assert_eq!(p.ceiling(4), Duration::from_millis(80));
        assert_eq!(p.ceiling(5), Duration::from_millis(100));
        assert_eq!(p.ceiling(40), Duration::from_millis(100));
    }

    #[test]
    fn test_delay_is_jittered_within_bounds() {
        let p = policy();
        for attempt in 1..=6 {
            let ceiling = p.ceiling(attempt);
            let d = p.delay(attempt);
            assert!(d <= ceiling && d >= ceiling / 2, "{:?} outside {:?}", d, ceiling);
        }
    }
}
