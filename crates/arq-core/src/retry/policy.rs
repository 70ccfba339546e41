//! Backoff computation for retry attempts.

use std::time::Duration;

use rand::Rng;

/// Backoff parameters for a retry sequence.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of retries after the initial attempt. A permanently
    /// failing call is attempted `max_retries + 1` times in total.
    pub max_retries: u32,
    /// Delay before the first retry, and the floor for server-directed delays.
    pub base_delay: Duration,
    /// Double the delay on every retry when true; constant `base_delay` when false.
    pub exponential: bool,
    /// Upper bound on the computed delay.
    pub max_delay: Duration,
    /// Upper bound on the random jitter added to each computed delay.
    /// Zero disables jitter entirely.
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            exponential: true,
            max_delay: Duration::from_secs(30),
            jitter: Duration::from_millis(300),
        }
    }
}

impl RetryPolicy {
    /// Deterministic backoff for the given retry attempt (1-based):
    /// `min(base * 2^(attempt-1), max_delay)`, or constant `base_delay`
    /// when exponential backoff is disabled.
    pub fn backoff(&self, attempt: u32) -> Duration {
        if !self.exponential {
            return self.base_delay.min(self.max_delay);
        }
        // Cap the shift; beyond this the delay saturates at max_delay anyway.
        let exp = attempt.saturating_sub(1).min(20);
        let raw = self.base_delay.saturating_mul(1u32 << exp);
        raw.min(self.max_delay)
    }

    /// Backoff plus a random jitter in `[0, jitter)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff(attempt) + self.random_jitter()
    }

    /// Delay for the next retry, honoring a server-directed hint
    /// (`Retry-After`) when present. The hint takes precedence over the
    /// computed backoff but is floored at `base_delay`.
    pub fn delay_with_hint(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        match hint {
            Some(server) => server.max(self.base_delay),
            None => self.delay_for(attempt),
        }
    }

    fn random_jitter(&self) -> Duration {
        let bound = self.jitter.as_millis() as u64;
        if bound == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..bound))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter() -> RetryPolicy {
        RetryPolicy {
            jitter: Duration::ZERO,
            ..RetryPolicy::default()
        }
    }

    #[test]
    fn backoff_doubles_until_cap() {
        let p = no_jitter();
        assert_eq!(p.delay_for(1), Duration::from_millis(1000));
        assert_eq!(p.delay_for(2), Duration::from_millis(2000));
        assert_eq!(p.delay_for(3), Duration::from_millis(4000));
        // Far attempts saturate at max_delay.
        assert_eq!(p.delay_for(10), Duration::from_secs(30));
        assert_eq!(p.delay_for(64), Duration::from_secs(30));
    }

    #[test]
    fn backoff_is_monotonic_without_jitter() {
        let p = no_jitter();
        for attempt in 1..40 {
            assert!(p.delay_for(attempt + 1) >= p.delay_for(attempt));
            assert!(p.delay_for(attempt) <= p.max_delay);
        }
    }

    #[test]
    fn constant_delay_when_exponential_disabled() {
        let p = RetryPolicy {
            exponential: false,
            ..no_jitter()
        };
        assert_eq!(p.delay_for(1), p.base_delay);
        assert_eq!(p.delay_for(7), p.base_delay);
    }

    #[test]
    fn jitter_stays_under_bound() {
        let p = RetryPolicy::default();
        for _ in 0..100 {
            let d = p.delay_for(1);
            assert!(d >= Duration::from_millis(1000));
            assert!(d < Duration::from_millis(1300));
        }
    }

    #[test]
    fn server_hint_takes_precedence() {
        let p = no_jitter();
        let d = p.delay_with_hint(1, Some(Duration::from_secs(5)));
        assert_eq!(d, Duration::from_secs(5));
    }

    #[test]
    fn server_hint_is_floored_at_base_delay() {
        let p = no_jitter();
        let d = p.delay_with_hint(1, Some(Duration::from_millis(10)));
        assert_eq!(d, p.base_delay);
    }
}
