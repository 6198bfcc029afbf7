//! Exponential spin/yield backoff for callers retrying on `Empty`/`Retry`.
//!
//! Nothing in the deque, lazy deque or pool ever spins or yields internally —
//! every operation returns as soon as it has an answer, per §5's "no
//! component blocks". This is strictly for the caller's own retry loop, e.g.
//! a worker that gets `Steal::Retry` and wants to back off before trying
//! again rather than hammering the same CAS.

use super::variant::thread;

/// Caps the exponent so a long-idle retry loop settles into plain
/// `thread::yield_now()` calls instead of spinning forever-longer.
const MAX_STEP: u32 = 10;
/// Step past which [`Backoff::snooze`] prefers yielding to the scheduler over spinning.
const YIELD_STEP: u32 = 6;

/// A single caller's escalating spin-then-yield retry strategy.
pub struct Backoff {
    step: u32,
}

impl Backoff {
    pub fn new() -> Self {
        Self { step: 0 }
    }

    /// Busy-spins for `2^step` iterations, then advances `step`.
    pub fn spin(&mut self) {
        for _ in 0..(1u32 << self.step.min(MAX_STEP)) {
            core::hint::spin_loop();
        }
        self.step = self.step.saturating_add(1);
    }

    pub fn reset(&mut self) {
        self.step = 0;
    }

    pub fn should_yield(&self) -> bool {
        self.step > YIELD_STEP
    }

    /// Spins while `step` is small, yields to the scheduler once retries have
    /// been going on long enough that spinning stops paying off.
    pub fn snooze(&mut self) {
        if self.should_yield() {
            thread::yield_now();
        } else {
            self.spin();
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}
