//! Reconnection backoff policy and per-session retry state.

use std::time::Duration;

use agent_stream_core::RetryInfo;

/// Backoff policy: capped exponential delay with a bounded attempt budget.
///
/// These are policy parameters, not protocol requirements; override the
/// defaults per deployment as needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Number of automatic retries before giving up.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: 5,
        }
    }
}

impl RetryPolicy {
    /// Backoff delay for a zero-based attempt: `min(base * 2^attempt, max)`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

/// Attempt counter for one session. Reset whenever a stream reaches
/// `Connected`; the pending-retry timer itself lives in the session task so
/// at most one scheduled retry exists per session.
#[derive(Debug, Default)]
pub(crate) struct RetryState {
    attempt: u32,
}

impl RetryState {
    pub(crate) const fn new() -> Self {
        Self { attempt: 0 }
    }

    /// Consume one attempt. Returns the retry to schedule, or `None` when
    /// the budget is exhausted.
    pub(crate) fn next(&mut self, policy: &RetryPolicy) -> Option<RetryInfo> {
        let delay = policy.delay_for(self.attempt);
        self.attempt += 1;
        if self.attempt > policy.max_attempts {
            None
        } else {
            Some(RetryInfo {
                attempt: self.attempt,
                max_attempts: policy.max_attempts,
                delay,
            })
        }
    }

    pub(crate) const fn reset(&mut self) {
        self.attempt = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_delay_table() {
        let policy = RetryPolicy::default();
        let delays: Vec<u64> = (0..7).map(|a| policy.delay_for(a).as_secs()).collect();
        assert_eq!(delays, [1, 2, 4, 8, 16, 30, 30]);
    }

    #[test]
    fn test_backoff_is_non_decreasing() {
        let policy = RetryPolicy::default();
        for attempt in 0..policy.max_attempts {
            assert!(policy.delay_for(attempt) <= policy.delay_for(attempt + 1));
        }
    }

    #[test]
    fn test_large_attempt_saturates_at_cap() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(40), policy.max_delay);
    }

    #[test]
    fn test_budget_yields_exactly_max_attempts() {
        let policy = RetryPolicy::default();
        let mut state = RetryState::new();

        let mut fired = Vec::new();
        while let Some(info) = state.next(&policy) {
            fired.push(info);
        }

        assert_eq!(fired.len(), policy.max_attempts as usize);
        assert_eq!(fired[0].attempt, 1);
        assert_eq!(fired[0].delay, Duration::from_secs(1));
        assert_eq!(fired.last().unwrap().attempt, policy.max_attempts);
        assert!(state.next(&policy).is_none());
    }

    #[test]
    fn test_reset_restores_full_budget() {
        let policy = RetryPolicy {
            max_attempts: 2,
            ..RetryPolicy::default()
        };
        let mut state = RetryState::new();
        assert!(state.next(&policy).is_some());
        assert!(state.next(&policy).is_some());
        assert!(state.next(&policy).is_none());

        state.reset();
        let first = state.next(&policy).unwrap();
        assert_eq!(first.attempt, 1);
        assert_eq!(first.delay, policy.base_delay);
    }
}
