//! Reconnect delays.

use std::time::Duration;

const FACTOR: f64 = 1.5;

/// Unbounded exponential backoff with a ceiling.
///
/// The delay before attempt `n` is `min(base * 1.5^n, max)`. Only a
/// successful connection resets the counter.
#[derive(Debug, Clone)]
pub struct Backoff {
    base_ms: u64,
    max_ms: u64,
    attempts: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base_ms: base.as_millis() as u64,
            max_ms: max.as_millis() as u64,
            attempts: 0,
        }
    }

    /// Delay for a given attempt count, without touching the counter.
    pub fn delay_for(&self, attempts: u32) -> Duration {
        let exp = attempts.min(i32::MAX as u32) as i32;
        let raw = self.base_ms as f64 * FACTOR.powi(exp);
        Duration::from_millis(raw.min(self.max_ms as f64) as u64)
    }

    /// Delay before the next reconnect; counts the attempt.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.delay_for(self.attempts);
        self.attempts = self.attempts.saturating_add(1);
        delay
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn backoff() -> Backoff {
        Backoff::new(Duration::from_millis(1000), Duration::from_millis(30_000))
    }

    #[test]
    fn grows_by_half_each_attempt() {
        let mut b = backoff();
        let delays: Vec<u64> = (0..4).map(|_| b.next_delay().as_millis() as u64).collect();
        assert_eq!(delays, vec![1000, 1500, 2250, 3375]);
        assert_eq!(b.attempts(), 4);
    }

    #[test]
    fn capped_and_reset() {
        let mut b = backoff();
        for _ in 0..20 {
            b.next_delay();
        }
        assert_eq!(b.next_delay(), Duration::from_millis(30_000));
        b.reset();
        assert_eq!(b.next_delay(), Duration::from_millis(1000));
    }

    proptest! {
        #[test]
        fn monotone_and_bounded(a in 0u32..200, b in 0u32..200) {
            let backoff = backoff();
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(backoff.delay_for(lo) <= backoff.delay_for(hi));
            prop_assert!(backoff.delay_for(hi) <= Duration::from_millis(30_000));
            prop_assert!(backoff.delay_for(lo) >= Duration::from_millis(1000));
        }
    }
}
