//! Exponential backoff with jitter.

use rand::Rng;
use std::time::Duration;

/// Calculate exponential backoff delay with jitter.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let capped_delay = base_ms.saturating_mul(exponential_base).min(max_ms);

    // Jitter of up to 10% of the delay
    let jitter_range = capped_delay / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay + jitter)
}

/// Bounded sequence of attempts with growing delays between them.
#[derive(Debug, Clone)]
pub struct Backoff {
    attempt: u32,
    max_attempts: u32,
    base_ms: u64,
    max_ms: u64,
}

impl Backoff {
    /// `max_attempts` of zero is treated as one.
    pub fn new(max_attempts: u32, base_ms: u64, max_ms: u64) -> Self {
        Self {
            attempt: 0,
            max_attempts: max_attempts.max(1),
            base_ms,
            max_ms,
        }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Delay to wait before the next attempt, or `None` once attempts are spent.
    /// The first attempt has no delay.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.max_attempts {
            return None;
        }
        let delay = calculate_backoff(self.attempt, self.base_ms, self.max_ms);
        self.attempt += 1;
        Some(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_calculation() {
        let b1 = calculate_backoff(1, 100, 2000);
        assert!(b1.as_millis() >= 100);

        let b2 = calculate_backoff(2, 100, 2000);
        assert!(b2.as_millis() >= 200);

        let max = calculate_backoff(10, 100, 1000);
        assert!(max.as_millis() >= 1000 && max.as_millis() < 1100);
    }

    #[test]
    fn bounded_attempts() {
        let mut backoff = Backoff::new(3, 10, 100);
        assert_eq!(backoff.next_delay(), Some(Duration::ZERO));
        assert!(backoff.next_delay().unwrap() >= Duration::from_millis(10));
        assert!(backoff.next_delay().unwrap() >= Duration::from_millis(20));
        assert_eq!(backoff.next_delay(), None);
        assert_eq!(backoff.attempt(), 3);

        let mut once = Backoff::new(0, 10, 100);
        assert!(once.next_delay().is_some());
        assert!(once.next_delay().is_none());
    }
}
