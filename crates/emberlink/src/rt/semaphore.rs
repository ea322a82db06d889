// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 emberlink.dev

//! Counting and binary semaphores.
//!
//! `signal_from_isr` is the ISR-safe variant: it never blocks and reports
//! whether a waiter was woken, i.e. whether the caller should request a
//! reschedule on return from interrupt.

use parking_lot::{Condvar, Mutex};
use std::time::Duration;

/// Counting semaphore; `binary()` caps the count at one.
pub struct Semaphore {
    count: Mutex<u32>,
    max: u32,
    cv: Condvar,
}

impl Semaphore {
    /// Counting semaphore with an initial count and no practical ceiling.
    #[must_use]
    pub fn counting(initial: u32) -> Self {
        Self {
            count: Mutex::new(initial),
            max: u32::MAX,
            cv: Condvar::new(),
        }
    }

    /// Binary semaphore, initially not signalled.
    #[must_use]
    pub fn binary() -> Self {
        Self {
            count: Mutex::new(0),
            max: 1,
            cv: Condvar::new(),
        }
    }

    /// Block until the count is positive, then decrement it.
    pub fn wait(&self) {
        let mut count = self.count.lock();
        while *count == 0 {
            self.cv.wait(&mut count);
        }
        *count -= 1;
    }

    /// Timed wait; `true` if the semaphore was taken before the deadline.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        let mut count = self.count.lock();
        while *count == 0 {
            if self.cv.wait_until(&mut count, deadline).timed_out() && *count == 0 {
                return false;
            }
        }
        *count -= 1;
        true
    }

    /// Non-blocking take; `true` on success.
    pub fn try_wait(&self) -> bool {
        let mut count = self.count.lock();
        if *count == 0 {
            return false;
        }
        *count -= 1;
        true
    }

    /// Increment the count (saturating at the binary ceiling) and wake one
    /// waiter.
    pub fn signal(&self) {
        let mut count = self.count.lock();
        if *count < self.max {
            *count += 1;
        }
        drop(count);
        self.cv.notify_one();
    }

    /// ISR-safe signal: never blocks on the fast path; returns whether a
    /// waiter was woken (a reschedule is warranted).
    pub fn signal_from_isr(&self) -> bool {
        let mut count = self.count.lock();
        if *count < self.max {
            *count += 1;
        }
        drop(count);
        self.cv.notify_one()
    }

    /// Current count.
    #[must_use]
    pub fn count(&self) -> u32 {
        *self.count.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn counting_take_and_give() {
        let sem = Semaphore::counting(2);
        assert!(sem.try_wait());
        assert!(sem.try_wait());
        assert!(!sem.try_wait());
        sem.signal();
        assert_eq!(sem.count(), 1);
    }

    #[test]
    fn binary_saturates_at_one() {
        let sem = Semaphore::binary();
        sem.signal();
        sem.signal();
        assert_eq!(sem.count(), 1);
        assert!(sem.try_wait());
        assert!(!sem.try_wait());
    }

    #[test]
    fn wait_timeout_expires() {
        let sem = Semaphore::binary();
        assert!(!sem.wait_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn signal_wakes_blocked_waiter() {
        let sem = Arc::new(Semaphore::binary());
        let sem2 = sem.clone();
        let t = std::thread::spawn(move || sem2.wait());
        std::thread::sleep(Duration::from_millis(20));
        let woke = sem.signal_from_isr();
        t.join().unwrap();
        assert!(woke);
    }
}
