// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 emberlink.dev

//! Event flag groups.
//!
//! A 32-bit flag set tasks can block on, waiting for any or all of a mask.

use parking_lot::{Condvar, Mutex};
use std::time::Duration;

/// Whether a wait is satisfied by any flag of the mask or all of them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitMode {
    /// Any flag in the mask satisfies the wait.
    Any,
    /// All flags in the mask must be set simultaneously.
    All,
}

/// A bitset of event flags with blocking waits.
pub struct EventGroup {
    flags: Mutex<u32>,
    cv: Condvar,
}

impl EventGroup {
    /// Create an event group with all flags clear.
    #[must_use]
    pub fn new() -> Self {
        Self {
            flags: Mutex::new(0),
            cv: Condvar::new(),
        }
    }

    /// Set `flags` and wake all waiters.
    pub fn set(&self, flags: u32) {
        let mut current = self.flags.lock();
        *current |= flags;
        drop(current);
        self.cv.notify_all();
    }

    /// Clear `flags`.
    pub fn clear(&self, flags: u32) {
        *self.flags.lock() &= !flags;
    }

    /// Current flag set.
    #[must_use]
    pub fn get(&self) -> u32 {
        *self.flags.lock()
    }

    /// Block until the mask is satisfied; returns the flags observed at
    /// wake-up. With `clear_on_exit` the satisfying flags are consumed.
    pub fn wait(&self, mask: u32, mode: WaitMode, clear_on_exit: bool) -> u32 {
        let mut flags = self.flags.lock();
        while !Self::satisfied(*flags, mask, mode) {
            self.cv.wait(&mut flags);
        }
        let observed = *flags;
        if clear_on_exit {
            *flags &= !mask;
        }
        observed
    }

    /// Timed [`wait`](Self::wait); `None` if the deadline passed first.
    pub fn wait_timeout(
        &self,
        mask: u32,
        mode: WaitMode,
        clear_on_exit: bool,
        timeout: Duration,
    ) -> Option<u32> {
        let deadline = std::time::Instant::now() + timeout;
        let mut flags = self.flags.lock();
        while !Self::satisfied(*flags, mask, mode) {
            if self.cv.wait_until(&mut flags, deadline).timed_out()
                && !Self::satisfied(*flags, mask, mode)
            {
                return None;
            }
        }
        let observed = *flags;
        if clear_on_exit {
            *flags &= !mask;
        }
        Some(observed)
    }

    fn satisfied(flags: u32, mask: u32, mode: WaitMode) -> bool {
        match mode {
            WaitMode::Any => flags & mask != 0,
            WaitMode::All => flags & mask == mask,
        }
    }
}

impl Default for EventGroup {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const READY: u32 = 1 << 0;
    const DONE: u32 = 1 << 1;

    #[test]
    fn set_then_wait_any() {
        let group = EventGroup::new();
        group.set(READY);
        let observed = group.wait(READY | DONE, WaitMode::Any, false);
        assert_eq!(observed & READY, READY);
    }

    #[test]
    fn wait_all_needs_both() {
        let group = EventGroup::new();
        group.set(READY);
        assert!(group
            .wait_timeout(READY | DONE, WaitMode::All, false, Duration::from_millis(10))
            .is_none());
        group.set(DONE);
        assert!(group
            .wait_timeout(READY | DONE, WaitMode::All, false, Duration::from_millis(10))
            .is_some());
    }

    #[test]
    fn clear_on_exit_consumes_mask() {
        let group = EventGroup::new();
        group.set(READY | DONE);
        group.wait(READY, WaitMode::Any, true);
        assert_eq!(group.get(), DONE);
    }

    #[test]
    fn waiter_wakes_on_set_from_other_thread() {
        let group = Arc::new(EventGroup::new());
        let group2 = group.clone();
        let t = std::thread::spawn(move || group2.wait(DONE, WaitMode::Any, true));
        std::thread::sleep(Duration::from_millis(20));
        group.set(DONE);
        assert_eq!(t.join().unwrap() & DONE, DONE);
    }
}
