use std::time::Duration;

/// Exponential reconnect schedule: `min(base * 2^(attempt-1), cap)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base: Duration,
    pub cap: Duration,
    /// Retries allowed after a failure; one more failure is terminal.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        ReconnectPolicy {
            base: Duration::from_secs(1),
            cap: Duration::from_secs(30),
            max_attempts: 5,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before retry number `attempt` (1-based). Zero for attempt 0.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(attempt - 1);
        self.base.saturating_mul(factor).min(self.cap)
    }

    /// Whether retry number `attempt` is still allowed.
    pub fn allows(&self, attempt: u32) -> bool {
        attempt <= self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schedule_doubles() {
        let policy = ReconnectPolicy::default();
        let delays: Vec<u64> = (1..=5).map(|n| policy.delay_for(n).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16]);
    }

    #[test]
    fn delay_never_exceeds_cap() {
        let policy = ReconnectPolicy::default();
        for attempt in 1..64 {
            assert!(policy.delay_for(attempt) <= policy.cap);
        }
        assert_eq!(policy.delay_for(6), Duration::from_secs(30));
        assert_eq!(policy.delay_for(40), Duration::from_secs(30));
    }

    #[test]
    fn sixth_retry_is_not_allowed() {
        let policy = ReconnectPolicy::default();
        assert!(policy.allows(5));
        assert!(!policy.allows(6));
    }

    #[test]
    fn attempt_zero_has_no_delay() {
        assert_eq!(ReconnectPolicy::default().delay_for(0), Duration::ZERO);
    }
}
