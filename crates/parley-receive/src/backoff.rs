//! Restart delay for the continuous receive loop.

use std::time::Duration;

/// Doubling delay: `base * 2^n`, with `n` capped at `max_exponent`.
#[derive(Clone, Debug)]
pub struct ReconnectBackoff {
    base: Duration,
    max_exponent: u32,
    attempt: u32,
}

impl ReconnectBackoff {
    /// Backoff starting at `base`.
    pub fn new(base: Duration, max_exponent: u32) -> Self {
        Self {
            base,
            max_exponent,
            attempt: 0,
        }
    }

    /// Delay before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        let exponent = self.attempt.min(self.max_exponent);
        self.attempt = self.attempt.saturating_add(1);
        self.base.saturating_mul(2_u32.saturating_pow(exponent))
    }

    /// Forget earlier failures.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_up_to_cap() {
        let mut backoff = ReconnectBackoff::new(Duration::from_millis(100), 3);
        let delays: Vec<u128> = (0..6).map(|_| backoff.next_delay().as_millis()).collect();
        assert_eq!(delays, [100, 200, 400, 800, 800, 800]);
    }

    #[test]
    fn reset_starts_over() {
        let mut backoff = ReconnectBackoff::new(Duration::from_millis(100), 9);
        let _ = backoff.next_delay();
        let _ = backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    }

    #[test]
    fn huge_exponent_saturates() {
        let mut backoff = ReconnectBackoff::new(Duration::from_secs(1), 64);
        for _ in 0..70 {
            let _ = backoff.next_delay();
        }
        assert!(backoff.next_delay() >= Duration::from_secs(1 << 31));
    }
}
