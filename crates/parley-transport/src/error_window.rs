//! "N events within T" detection over a fixed slot array.

use std::time::Duration;

use tokio::time::Instant;

/// Counts recent error samples and reports when `capacity` of them fall
/// within a trailing `window`.
///
/// Each slot holds a sample timestamp or `None`. `None` orders below every
/// timestamp, so inserting into the smallest slot reuses empty and expired
/// slots before evicting live ones. Expiry is evaluated lazily inside
/// [`add_sample`](Self::add_sample); there is no timer.
#[derive(Clone, Debug)]
pub struct ErrorWindowTracker {
    slots: Vec<Option<Instant>>,
    window: Duration,
}

impl ErrorWindowTracker {
    /// Tracker that fires on the `samples`-th error within `window`.
    ///
    /// A capacity of zero is treated as one.
    pub fn new(samples: usize, window: Duration) -> Self {
        Self {
            slots: vec![None; samples.max(1)],
            window,
        }
    }

    /// Record an error at `now`.
    ///
    /// Returns `true`, and clears every slot, when this sample brings the
    /// number of samples within the window up to capacity. Out-of-order
    /// timestamps are tolerated.
    pub fn add_sample(&mut self, now: Instant) -> bool {
        // Before the clock has run for a full window nothing can be stale.
        let cutoff = now.checked_sub(self.window);
        let mut count = 1;
        let mut oldest = 0;

        for i in 0..self.slots.len() {
            match (self.slots[i], cutoff) {
                (Some(at), Some(cutoff)) if at < cutoff => self.slots[i] = None,
                (Some(_), _) => count += 1,
                (None, _) => {}
            }
            if self.slots[i] < self.slots[oldest] {
                oldest = i;
            }
        }

        self.slots[oldest] = Some(now);

        if count >= self.slots.len() {
            self.slots.fill(None);
            return true;
        }
        false
    }

    /// Occupied slots, including ones that would expire on the next sample.
    pub fn pending(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Samples within the window needed to fire.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Width of the trailing window.
    pub fn window(&self) -> Duration {
        self.window
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    const WINDOW: Duration = Duration::from_secs(60);

    fn base() -> Instant {
        // Far enough from the clock origin that `now - window` never underflows.
        Instant::now() + Duration::from_secs(3600)
    }

    #[test]
    fn fires_on_fifth_sample_within_window() {
        let mut tracker = ErrorWindowTracker::new(5, WINDOW);
        let t0 = base();
        let results: Vec<bool> = (0..5)
            .map(|i| tracker.add_sample(t0 + Duration::from_secs(i * 10)))
            .collect();
        assert_eq!(results, [false, false, false, false, true]);
    }

    #[test]
    fn resets_after_firing() {
        let mut tracker = ErrorWindowTracker::new(5, WINDOW);
        let t0 = base();
        for i in 0..5 {
            let _ = tracker.add_sample(t0 + Duration::from_secs(i));
        }
        assert_eq!(tracker.pending(), 0);
        assert!(!tracker.add_sample(t0 + Duration::from_secs(5)));
        assert_eq!(tracker.pending(), 1);
    }

    #[test]
    fn samples_spaced_beyond_window_never_fire() {
        let mut tracker = ErrorWindowTracker::new(5, WINDOW);
        let t0 = base();
        for i in 0..20 {
            assert!(!tracker.add_sample(t0 + Duration::from_secs(i * 61)));
        }
    }

    #[test]
    fn expired_slots_are_reused_first() {
        let mut tracker = ErrorWindowTracker::new(3, WINDOW);
        let t0 = base();
        assert!(!tracker.add_sample(t0));
        assert!(!tracker.add_sample(t0 + Duration::from_secs(1)));
        // Both earlier samples are now stale.
        let later = t0 + Duration::from_secs(120);
        assert!(!tracker.add_sample(later));
        assert_eq!(tracker.pending(), 1);
        assert!(!tracker.add_sample(later + Duration::from_secs(1)));
        assert!(tracker.add_sample(later + Duration::from_secs(2)));
    }

    #[test]
    fn sample_exactly_at_cutoff_is_kept() {
        let mut tracker = ErrorWindowTracker::new(2, WINDOW);
        let t0 = base();
        assert!(!tracker.add_sample(t0));
        assert!(tracker.add_sample(t0 + WINDOW));
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut tracker = ErrorWindowTracker::new(0, WINDOW);
        assert_eq!(tracker.capacity(), 1);
        assert!(tracker.add_sample(base()));
    }

    #[test]
    fn tolerates_out_of_order_samples() {
        let mut tracker = ErrorWindowTracker::new(3, WINDOW);
        let t0 = base();
        assert!(!tracker.add_sample(t0 + Duration::from_secs(30)));
        assert!(!tracker.add_sample(t0 + Duration::from_secs(10)));
        assert!(tracker.add_sample(t0 + Duration::from_secs(20)));
    }

    #[test]
    fn accessors() {
        let tracker = ErrorWindowTracker::new(5, WINDOW);
        assert_eq!(tracker.capacity(), 5);
        assert_eq!(tracker.window(), WINDOW);
        assert_eq!(tracker.pending(), 0);
    }

    proptest! {
        #[test]
        fn pending_never_exceeds_capacity(
            capacity in 1usize..8,
            gaps in proptest::collection::vec(0u64..120_000, 1..64),
        ) {
            let mut tracker = ErrorWindowTracker::new(capacity, WINDOW);
            let mut now = base();
            for gap in gaps {
                now += Duration::from_millis(gap);
                let _ = tracker.add_sample(now);
                prop_assert!(tracker.pending() <= capacity);
            }
        }

        #[test]
        fn fires_iff_capacity_samples_in_window(
            capacity in 1usize..8,
            gaps in proptest::collection::vec(0u64..90_000, 1..64),
        ) {
            // Reference model: samples since the last firing, filtered by the window.
            let mut tracker = ErrorWindowTracker::new(capacity, WINDOW);
            let mut live: Vec<Instant> = Vec::new();
            let mut now = base();
            for gap in gaps {
                now += Duration::from_millis(gap);
                let cutoff = now - WINDOW;
                live.retain(|at| *at >= cutoff);
                live.push(now);
                if live.len() > capacity {
                    let _ = live.remove(0);
                }
                let expected = live.len() >= capacity;
                if expected {
                    live.clear();
                }
                prop_assert_eq!(tracker.add_sample(now), expected);
            }
        }
    }
}
