use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Computes the wait after a number of consecutive failures.
///
/// The interval doubles with every failure, starting at `initial` and capped at `max`:
///
/// ```
/// use std::time::Duration;
/// use raven_transport::BackoffSchedule;
///
/// let schedule = BackoffSchedule::new(Duration::from_secs(1), Duration::from_secs(30));
/// assert_eq!(schedule.interval(0), Duration::ZERO);
/// assert_eq!(schedule.interval(1), Duration::from_secs(1));
/// assert_eq!(schedule.interval(3), Duration::from_secs(4));
/// assert_eq!(schedule.interval(10), Duration::from_secs(30));
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BackoffSchedule {
    initial: Duration,
    max: Duration,
}

impl BackoffSchedule {
    /// Creates a schedule starting at `initial` and never exceeding `max`.
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self { initial, max }
    }

    /// Returns the wait after `failures` consecutive failures.
    pub fn interval(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }

        let exponent = (failures - 1).min(31);
        self.initial
            .saturating_mul(1u32 << exponent)
            .min(self.max)
    }
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(30))
    }
}

#[derive(Debug, Default)]
struct StateInner {
    failures: u32,
    retry_after: Option<Instant>,
}

/// Failure and backoff gate shared by all sends through one transport.
///
/// The state is `ready` until a send fails. Each failure pushes the next allowed attempt out by
/// the [`BackoffSchedule`] interval for the new failure count. A success returns to `ready`.
#[derive(Debug, Default)]
pub struct TransportState {
    schedule: BackoffSchedule,
    inner: Mutex<StateInner>,
}

impl TransportState {
    /// Creates a ready state with the given schedule.
    pub fn new(schedule: BackoffSchedule) -> Self {
        Self {
            schedule,
            inner: Mutex::new(StateInner::default()),
        }
    }

    /// Returns `true` if a send may be attempted now.
    pub fn should_try(&self) -> bool {
        self.should_try_at(Instant::now())
    }

    /// Returns `true` if a send may be attempted at the given time.
    pub fn should_try_at(&self, now: Instant) -> bool {
        match self.inner.lock().retry_after {
            Some(retry_after) => now >= retry_after,
            None => true,
        }
    }

    /// Records a failed send now.
    pub fn failure(&self) {
        self.failure_at(Instant::now());
    }

    /// Records a failed send at the given time.
    pub fn failure_at(&self, now: Instant) {
        let mut inner = self.inner.lock();
        inner.failures = inner.failures.saturating_add(1);
        inner.retry_after = Some(now + self.schedule.interval(inner.failures));
    }

    /// Records a successful send, resetting the failure count.
    pub fn success(&self) {
        let mut inner = self.inner.lock();
        inner.failures = 0;
        inner.retry_after = None;
    }

    /// Returns the number of consecutive failures.
    pub fn failures(&self) -> u32 {
        self.inner.lock().failures
    }

    /// Returns the earliest time of the next attempt, if backing off.
    pub fn retry_after(&self) -> Option<Instant> {
        self.inner.lock().retry_after
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn test_schedule_is_monotonic_and_capped() {
        let schedule = BackoffSchedule::new(Duration::from_secs(1), Duration::from_secs(30));
        let intervals: Vec<u64> = (1..=8).map(|n| schedule.interval(n).as_secs()).collect();
        assert_eq!(intervals, [1, 2, 4, 8, 16, 30, 30, 30]);
        assert_eq!(schedule.interval(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_ready_initially() {
        let state = TransportState::default();
        assert!(state.should_try());
        assert_eq!(state.failures(), 0);
        assert!(state.retry_after().is_none());
    }

    #[test]
    fn test_two_failures_back_off_until_deadline() {
        let state = TransportState::new(BackoffSchedule::default());
        let start = Instant::now();

        state.failure_at(start);
        state.failure_at(start);
        assert_eq!(state.failures(), 2);

        let deadline = start + Duration::from_secs(2);
        assert_eq!(state.retry_after(), Some(deadline));
        assert!(!state.should_try_at(start));
        assert!(!state.should_try_at(deadline - Duration::from_millis(1)));
        assert!(state.should_try_at(deadline));

        state.success();
        assert_eq!(state.failures(), 0);
        assert!(state.should_try_at(start));
    }

    #[test]
    fn test_failure_extends_backoff() {
        let state = TransportState::new(BackoffSchedule::default());
        let start = Instant::now();

        state.failure_at(start);
        let first = state.retry_after().unwrap();

        let later = first + Duration::from_millis(10);
        assert!(state.should_try_at(later));
        state.failure_at(later);

        assert_eq!(state.retry_after(), Some(later + Duration::from_secs(2)));
    }

    #[test]
    fn test_concurrent_failures_are_counted() {
        let state = Arc::new(TransportState::default());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let state = Arc::clone(&state);
                thread::spawn(move || {
                    for _ in 0..100 {
                        state.failure();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(state.failures(), 800);
        assert!(!state.should_try());
    }
}
