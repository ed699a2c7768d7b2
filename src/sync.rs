//! Cooperative-scheduling primitives.
//!
//! The guest model (SPEC_FULL.md §5) is single-threaded and cooperative:
//! one thread runs until it explicitly yields or blocks on a semaphore.
//! This crate is exercised under real OS threads (§5.1), so "yield" and
//! "block on an empty semaphore" are realized with genuine thread
//! parking rather than a hand-rolled scheduler — the linearization
//! guarantees the spec describes hold either way.

use std::sync::{Condvar, Mutex};

/// A counting semaphore with blocking `P`/`V`, standing in for the guest
/// scheduler's semaphore primitive (SPEC_FULL.md §6).
pub struct Semaphore {
    state: Mutex<i64>,
    cond: Condvar,
}

impl Semaphore {
    pub fn new(initial: i64) -> Self {
        Semaphore { state: Mutex::new(initial), cond: Condvar::new() }
    }

    /// `P`: decrement, blocking the calling thread while the count is zero.
    pub fn p(&self) {
        let mut count = self.state.lock().unwrap();
        while *count <= 0 {
            count = self.cond.wait(count).unwrap();
        }
        *count -= 1;
    }

    /// `V`: increment and wake one waiter.
    pub fn v(&self) {
        let mut count = self.state.lock().unwrap();
        *count += 1;
        self.cond.notify_one();
    }

    #[cfg(test)]
    pub fn value(&self) -> i64 {
        *self.state.lock().unwrap()
    }
}

/// Busy-spin on `condition` until it returns `false`, yielding the
/// processor between checks exactly like the `while bit: yield` spins of
/// SPEC_FULL.md §4.D/§5. `scheduler` is whatever stands in for the guest
/// scheduler in the caller's context.
pub fn spin_while<F: FnMut() -> bool>(scheduler: &dyn crate::machine::Scheduler, mut condition: F) {
    while condition() {
        scheduler.yield_now();
    }
}
