//! Monotonic time source and cooperative non-blocking timers.
//!
//! [`millis`]/[`micros`] count from an arbitrary epoch on `CLOCK_MONOTONIC`
//! and never go backwards. [`delay_ms`]/[`delay_us`] are the timing
//! primitives the software PWM engine leans on: a coarse sleep for the bulk
//! of the wait, then a spin for the final stretch, bounding overshoot to tens
//! of microseconds instead of a scheduler quantum.

use nix::time::{ClockId, clock_gettime};
use std::time::Duration;

/// Remaining wait below this is spun, not slept.
///
/// Wide enough to absorb `thread::sleep` overshoot (kernel timer slack plus
/// scheduler latency at normal priority), so the final stretch is always
/// finished by the spin, not by a late wakeup.
const SPIN_THRESHOLD_US: u64 = 1_000;

/// Monotonic milliseconds since an arbitrary epoch.
#[inline]
pub fn millis() -> u64 {
    let ts = clock_gettime(ClockId::CLOCK_MONOTONIC).expect("clock_gettime(CLOCK_MONOTONIC)");
    ts.tv_sec() as u64 * 1_000 + ts.tv_nsec() as u64 / 1_000_000
}

/// Monotonic microseconds since an arbitrary epoch.
#[inline]
pub fn micros() -> u64 {
    let ts = clock_gettime(ClockId::CLOCK_MONOTONIC).expect("clock_gettime(CLOCK_MONOTONIC)");
    ts.tv_sec() as u64 * 1_000_000 + ts.tv_nsec() as u64 / 1_000
}

/// Block the calling thread for at least `ms` milliseconds.
pub fn delay_ms(ms: u64) {
    delay_us(ms * 1_000);
}

/// Block the calling thread for at least `us` microseconds.
///
/// Hybrid wait: sleeps toward a [`SPIN_THRESHOLD_US`] margin while more than
/// that remains, then busy-spins to the deadline. The loop re-checks the
/// deadline after every sleep, so a late wakeup only eats into the spin
/// margin instead of blowing past the deadline.
pub fn delay_us(us: u64) {
    let deadline = micros() + us;
    loop {
        let now = micros();
        if now >= deadline {
            break;
        }
        let remaining = deadline - now;
        if remaining > SPIN_THRESHOLD_US {
            std::thread::sleep(Duration::from_micros(remaining - SPIN_THRESHOLD_US));
        } else {
            std::hint::spin_loop();
        }
    }
}

/// Non-blocking interval timer, polled cooperatively by the caller's loop.
///
/// Plain value with no OS resources: two integers manipulated against
/// [`millis`]. [`Timer::expired`] peeks, [`Timer::tick`] consumes one event
/// per elapsed interval — the classic edge-triggered polling split.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timer {
    /// Instant (in [`millis`] time) at which the timer next expires.
    pub next_expiry: u64,
    /// Interval in milliseconds.
    pub interval: u64,
}

impl Timer {
    /// Create an unarmed timer (immediately expired, zero interval).
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the timer: first expiry is `interval_ms` from now.
    ///
    /// An interval of 0 arms an immediately-expired timer.
    pub fn set(&mut self, interval_ms: u64) {
        self.interval = interval_ms;
        self.next_expiry = millis() + interval_ms;
    }

    /// Whether the timer has expired. Pure peek, never advances.
    pub fn expired(&self) -> bool {
        millis() >= self.next_expiry
    }

    /// Consume one expiry: if expired, advance `next_expiry` by exactly one
    /// interval and return true; otherwise leave the timer untouched.
    ///
    /// Advancing from the previous expiry rather than from `now()` keeps
    /// long-running periodic loops anchored to the true interval boundaries
    /// with no drift accumulation.
    pub fn tick(&mut self) -> bool {
        if millis() >= self.next_expiry {
            self.next_expiry += self.interval;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_is_monotonic() {
        let mut last = micros();
        for _ in 0..1_000 {
            let now = micros();
            assert!(now >= last);
            last = now;
        }
    }

    #[test]
    fn millis_and_micros_agree() {
        let ms = millis();
        let us = micros();
        // Same clock, so the microsecond reading can only be ahead.
        assert!(us / 1_000 >= ms);
        assert!(us / 1_000 - ms < 50);
    }

    #[test]
    fn delay_us_waits_at_least_requested() {
        let start = micros();
        delay_us(2_000);
        let elapsed = micros() - start;
        assert!(elapsed >= 2_000, "only waited {elapsed}us");
        // Overshoot stays well under a scheduler quantum.
        assert!(elapsed < 12_000, "waited {elapsed}us");
    }

    #[test]
    fn sleep_overshoot_is_absorbed_by_the_spin_margin() {
        // Long enough to take the sleep path. Median over several runs keeps
        // a single noisy-scheduler outlier from deciding the verdict.
        let mut runs: Vec<u64> = (0..15)
            .map(|_| {
                let start = micros();
                delay_us(3_000);
                micros() - start
            })
            .collect();
        runs.sort_unstable();
        let median = runs[runs.len() / 2];
        assert!(median >= 3_000, "undershoot: {median}us");
        assert!(median < 4_000, "typical overshoot too large: {median}us");
    }

    #[test]
    fn zero_interval_is_immediately_expired() {
        let mut t = Timer::new();
        t.set(0);
        assert!(t.expired());
        assert!(t.tick());
    }

    #[test]
    fn fresh_interval_is_not_expired() {
        let mut t = Timer::new();
        t.set(10_000);
        assert!(!t.expired());
        assert!(!t.tick());
    }

    #[test]
    fn expired_is_idempotent() {
        let mut t = Timer::new();
        t.set(0);
        let before = t;
        assert!(t.expired());
        assert!(t.expired());
        assert_eq!(t, before, "expired() must not mutate");
    }

    #[test]
    fn tick_advances_by_exactly_one_interval() {
        let mut t = Timer::new();
        t.set(20);
        let armed_expiry = t.next_expiry;

        delay_ms(25);
        assert!(t.tick());
        assert_eq!(t.next_expiry, armed_expiry + 20, "advance anchors on the interval boundary");
        assert!(!t.tick(), "one event per elapsed interval");
    }
}
