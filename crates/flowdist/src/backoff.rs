use std::hint;
use std::thread;

/// Adaptive spin-wait (Crossbeam-style).
///
/// Progressively increases wait time: spin with PAUSE hints, then yield to
/// the OS scheduler. The dispatch protocol has no cancellation, so unlike
/// the usual shape there is no give-up step; callers spin until the other
/// side makes progress.
#[derive(Debug)]
pub struct Backoff {
    step: u32,
}

impl Backoff {
    const SPIN_LIMIT: u32 = 6; // 2^6 = 64 spins max before yielding

    /// Creates a new backoff instance.
    #[inline]
    pub fn new() -> Self {
        Self { step: 0 }
    }

    /// Waits once: light PAUSE spinning at first, `yield_now` once the spin
    /// budget is exhausted.
    #[inline]
    pub fn snooze(&mut self) {
        if self.step <= Self::SPIN_LIMIT {
            for _ in 0..(1 << self.step) {
                hint::spin_loop();
            }
            self.step += 1;
        } else {
            thread::yield_now();
        }
    }

    /// Reset for the next wait cycle.
    #[inline]
    pub fn reset(&mut self) {
        self.step = 0;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snooze_progresses_past_spin_budget() {
        let mut b = Backoff::new();
        for _ in 0..=Backoff::SPIN_LIMIT + 2 {
            b.snooze();
        }
        // Step saturates just past the spin budget; further snoozes yield.
        assert_eq!(b.step, Backoff::SPIN_LIMIT + 1);

        b.reset();
        assert_eq!(b.step, 0);
    }
}
