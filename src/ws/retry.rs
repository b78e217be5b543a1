//! Attempt counting and backoff for automatic reconnection.

use std::time::Duration;

use backoff::ExponentialBackoff;
use backoff::backoff::Backoff as _;

use super::config::ReconnectConfig;

/// Tracks reconnection attempts and the delay before the next one.
///
/// The attempt counter and the backoff interval advance together, only when a
/// scheduled retry fires, so the delay always equals
/// `min(initial * multiplier^attempts, max)`.
pub(crate) struct RetrySchedule {
    attempts: u32,
    max_attempts: Option<u32>,
    backoff: ExponentialBackoff,
}

impl RetrySchedule {
    pub(crate) fn new(config: ReconnectConfig) -> Self {
        Self {
            attempts: 0,
            max_attempts: config.max_attempts,
            backoff: config.into(),
        }
    }

    pub(crate) const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Whether the attempt budget has been used up.
    pub(crate) fn exhausted(&self) -> bool {
        self.max_attempts.is_some_and(|max| self.attempts >= max)
    }

    /// Delay to wait before the next retry, without consuming it.
    pub(crate) const fn delay(&self) -> Duration {
        self.backoff.current_interval
    }

    /// Record that a scheduled retry fired.
    pub(crate) fn advance(&mut self) {
        self.attempts = self.attempts.saturating_add(1);
        _ = self.backoff.next_backoff();
    }

    pub(crate) fn reset(&mut self) {
        self.attempts = 0;
        self.backoff.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delays_until_exhausted(schedule: &mut RetrySchedule) -> Vec<Duration> {
        let mut delays = Vec::new();
        while !schedule.exhausted() {
            delays.push(schedule.delay());
            schedule.advance();
        }
        delays
    }

    #[test]
    fn default_schedule_is_capped_at_five_attempts() {
        let mut schedule = RetrySchedule::new(ReconnectConfig::default());

        let delays = delays_until_exhausted(&mut schedule);

        assert_eq!(delays, [1, 2, 4, 8, 10].map(Duration::from_secs).to_vec());
        assert_eq!(schedule.attempts(), 5);
        assert!(schedule.exhausted());
    }

    #[test]
    fn delay_is_not_consumed_by_peeking() {
        let schedule = RetrySchedule::new(ReconnectConfig::default());

        assert_eq!(schedule.delay(), Duration::from_secs(1));
        assert_eq!(schedule.delay(), Duration::from_secs(1));
        assert_eq!(schedule.attempts(), 0);
    }

    #[test]
    fn reset_restarts_from_initial_delay() {
        let mut schedule = RetrySchedule::new(ReconnectConfig::default());
        schedule.advance();
        schedule.advance();
        schedule.advance();
        assert_eq!(schedule.delay(), Duration::from_secs(8));

        schedule.reset();

        assert_eq!(schedule.attempts(), 0);
        assert_eq!(schedule.delay(), Duration::from_secs(1));
        assert!(!schedule.exhausted());
    }

    #[test]
    fn unbounded_schedule_never_exhausts() {
        let config = ReconnectConfig::new(
            None,
            Duration::from_millis(10),
            Duration::from_millis(50),
            2.0,
        );
        let mut schedule = RetrySchedule::new(config);

        for _ in 0..100 {
            schedule.advance();
        }

        assert!(!schedule.exhausted());
        assert_eq!(schedule.delay(), Duration::from_millis(50));
    }
}
