//! Exponential reconnect backoff.

use std::time::{Duration, Instant};

/// A deadline that doubles on every failure, up to a cap, and rewinds
/// to its initial interval on success.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    cap: Duration,
    current: Duration,
    deadline: Instant,
}

impl Backoff {
    pub fn new(initial: Duration, cap: Duration) -> Self {
        Backoff {
            initial,
            cap,
            current: initial,
            deadline: Instant::now() + initial,
        }
    }

    /// True once the current waiting interval has passed.
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// The interval currently being waited.
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Success: shrink back to the initial interval and restart it.
    pub fn rewind(&mut self) {
        self.current = self.initial;
        self.deadline = Instant::now() + self.current;
    }

    /// Failure: double the interval (capped) and restart it.
    pub fn extend(&mut self) {
        self.current = (self.current * 2).min(self.cap);
        self.deadline = Instant::now() + self.current;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extend_is_monotonic_and_capped() {
        let mut b = Backoff::new(Duration::from_secs(1), Duration::from_secs(60));
        let mut prev = b.current();
        for _ in 0..10 {
            b.extend();
            assert!(b.current() >= prev);
            assert!(b.current() <= Duration::from_secs(60));
            prev = b.current();
        }
        assert_eq!(b.current(), Duration::from_secs(60));
    }

    #[test]
    fn rewind_restores_initial_interval() {
        let mut b = Backoff::new(Duration::from_secs(1), Duration::from_secs(60));
        b.extend();
        b.extend();
        assert_eq!(b.current(), Duration::from_secs(4));
        b.rewind();
        assert_eq!(b.current(), Duration::from_secs(1));
    }

    #[test]
    fn zero_initial_interval_is_immediately_expired() {
        let b = Backoff::new(Duration::ZERO, Duration::from_secs(60));
        assert!(b.is_expired());
    }

    #[test]
    fn fresh_backoff_waits_its_initial_interval() {
        let b = Backoff::new(Duration::from_secs(60), Duration::from_secs(60));
        assert!(!b.is_expired());
    }
}
