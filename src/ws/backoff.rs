//! Reconnection delay policy.
//!
//! [`delay`] is the pure formula; [`ReconnectBudget`] pairs it with the attempt counter and
//! plugs into the [`backoff`] crate's [`Backoff`] trait so it can be driven like any other
//! backoff schedule.

use std::time::Duration;

use backoff::backoff::Backoff;

/// Growth factor applied per failed attempt.
pub const MULTIPLIER: f64 = 1.5;

/// Delay before reconnection attempt number `attempt` (1-based).
///
/// `delay(base, n) = base * 1.5^(n - 1)`. No jitter and no upper bound; attempt `0` is treated
/// as the first attempt.
///
/// ```
/// use std::time::Duration;
/// use resilient_ws::ws::backoff::delay;
///
/// let base = Duration::from_millis(3_000);
/// assert_eq!(delay(base, 1), Duration::from_millis(3_000));
/// assert_eq!(delay(base, 2), Duration::from_millis(4_500));
/// assert_eq!(delay(base, 3), Duration::from_millis(6_750));
/// ```
#[must_use]
#[expect(
    clippy::float_arithmetic,
    reason = "The growth factor is fractional, so the curve is computed in seconds as f64"
)]
pub fn delay(base: Duration, attempt: u32) -> Duration {
    let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
    let seconds = base.as_secs_f64() * MULTIPLIER.powi(exponent);

    // Saturate instead of panicking once the curve leaves Duration's range
    Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
}

/// Attempt counter bounded by `max_attempts`, yielding [`delay`] for each attempt.
///
/// [`Backoff::next_backoff`] consumes one attempt and returns `None` once the budget is spent;
/// [`Backoff::reset`] restores the full budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectBudget {
    base: Duration,
    max_attempts: u32,
    attempts: u32,
}

impl ReconnectBudget {
    #[must_use]
    pub const fn new(base: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            max_attempts,
            attempts: 0,
        }
    }

    /// Attempts consumed since the last reset.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

impl Backoff for ReconnectBudget {
    fn reset(&mut self) {
        self.attempts = 0;
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }

        self.attempts += 1;
        Some(delay(self.base, self.attempts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: Duration = Duration::from_millis(3_000);

    #[test]
    fn first_attempt_uses_base_interval() {
        assert_eq!(delay(BASE, 1), BASE);
        assert_eq!(delay(BASE, 0), BASE);
    }

    #[test]
    fn delay_grows_by_half_each_attempt() {
        let expected = [3_000, 4_500, 6_750, 10_125, 15_187];

        for (attempt, millis) in (1..).zip(expected) {
            assert_eq!(
                delay(BASE, attempt).as_millis(),
                millis,
                "attempt {attempt} should wait {millis}ms"
            );
        }
    }

    #[test]
    fn delay_is_monotonic() {
        let mut previous = Duration::ZERO;
        for attempt in 1..=40 {
            let current = delay(Duration::from_millis(100), attempt);
            assert!(current >= previous, "attempt {attempt} shrank the delay");
            previous = current;
        }
    }

    #[test]
    fn huge_attempt_saturates() {
        assert_eq!(delay(BASE, u32::MAX), Duration::MAX);
    }

    #[test]
    fn budget_yields_exactly_max_attempts() {
        let mut budget = ReconnectBudget::new(BASE, 3);

        assert_eq!(budget.next_backoff(), Some(delay(BASE, 1)));
        assert_eq!(budget.next_backoff(), Some(delay(BASE, 2)));
        assert_eq!(budget.next_backoff(), Some(delay(BASE, 3)));
        assert_eq!(budget.next_backoff(), None);
        assert!(budget.is_exhausted());
        assert_eq!(budget.attempts(), 3);
    }

    #[test]
    fn reset_restores_full_budget() {
        let mut budget = ReconnectBudget::new(BASE, 2);
        _ = budget.next_backoff();
        _ = budget.next_backoff();
        assert_eq!(budget.next_backoff(), None);

        budget.reset();

        assert_eq!(budget.attempts(), 0);
        assert_eq!(budget.next_backoff(), Some(BASE));
    }

    #[test]
    fn zero_budget_never_retries() {
        let mut budget = ReconnectBudget::new(BASE, 0);

        assert_eq!(budget.next_backoff(), None);
    }
}
