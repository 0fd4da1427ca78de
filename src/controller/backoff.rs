//! # Fibonacci Backoff
//!
//! Progressive retry intervals for failed reconciliations.
//!
//! The sequence starts at `min` minutes and grows along the Fibonacci
//! sequence (`min, min, 2·min, 3·min, 5·min, ...`) until it reaches `max`.

use std::time::Duration;

/// Stateful Fibonacci backoff counter
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    min_minutes: u64,
    max_minutes: u64,
    previous: u64,
    current: u64,
}

impl FibonacciBackoff {
    /// Create a backoff bounded by `[min_minutes, max_minutes]`
    pub fn new(min_minutes: u64, max_minutes: u64) -> Self {
        let min_minutes = min_minutes.max(1);
        let max_minutes = max_minutes.max(min_minutes);
        Self {
            min_minutes,
            max_minutes,
            previous: 0,
            current: min_minutes,
        }
    }

    /// Next backoff in seconds; advances the sequence
    pub fn next_backoff_seconds(&mut self) -> u64 {
        let minutes = self.current.min(self.max_minutes);
        let next = self.previous.saturating_add(self.current);
        self.previous = self.current;
        self.current = next.min(self.max_minutes);
        minutes * 60
    }

    /// Restart from the lower bound
    pub fn reset(&mut self) {
        self.previous = 0;
        self.current = self.min_minutes;
    }

    /// Backoff for the n-th consecutive error (0-indexed) without keeping state
    pub fn calculate_for_error_count(error_count: u32, min_minutes: u64, max_minutes: u64) -> Duration {
        let mut backoff = Self::new(min_minutes, max_minutes);
        let mut seconds = backoff.next_backoff_seconds();
        for _ in 0..error_count {
            seconds = backoff.next_backoff_seconds();
            if seconds >= backoff.max_minutes * 60 {
                break;
            }
        }
        Duration::from_secs(seconds)
    }
}

/// Per-resource backoff bookkeeping
#[derive(Debug, Clone)]
pub struct BackoffState {
    pub backoff: FibonacciBackoff,
    pub error_count: u32,
}

impl BackoffState {
    pub fn new(min_minutes: u64, max_minutes: u64) -> Self {
        Self {
            backoff: FibonacciBackoff::new(min_minutes, max_minutes),
            error_count: 0,
        }
    }

    pub fn increment_error(&mut self) {
        self.error_count = self.error_count.saturating_add(1);
    }
}
